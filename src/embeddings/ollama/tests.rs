use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, dimension: u32, batch_size: u32) -> OllamaConfig {
    let url = Url::parse(&server.uri()).expect("mock server uri parses");
    OllamaConfig {
        protocol: "http".to_string(),
        host: url.host_str().expect("mock server has host").to_string(),
        port: url.port().expect("mock server has port"),
        model: "all-minilm:l6-v2".to_string(),
        batch_size,
        embedding_dimension: dimension,
        timeout_seconds: 5,
    }
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model(), "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.dimension(), 384);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
}

#[tokio::test]
async fn embeds_in_batches_preserving_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["a", "b"]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0, 0.0], [0.0, 1.0]]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["c"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.5, 0.5]]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 2, 2)).expect("client builds");
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let vectors = client
        .embed_documents(&texts)
        .expect("embedding should succeed");

    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]);
}

#[tokio::test]
async fn embed_query_returns_single_vector() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.25, 0.75]]})))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 2, 16)).expect("client builds");
    let vector = client.embed_query("question").expect("query embeds");
    assert_eq!(vector, vec![0.25, 0.75]);
}

#[tokio::test]
async fn wrong_dimension_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.1, 0.2, 0.3]]})))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 384, 16)).expect("client builds");
    let error = client
        .embed_query("question")
        .expect_err("dimension mismatch must fail");
    assert!(format!("{:#}", error).contains("expected 384"));
}

#[tokio::test]
async fn server_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 2, 16)).expect("client builds");
    let error = client
        .embed_documents(&["x".to_string()])
        .expect_err("server error must fail");
    assert!(format!("{:#}", error).contains("500"));
}

#[tokio::test]
async fn empty_input_makes_no_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 2, 16)).expect("client builds");
    assert!(client.embed_documents(&[]).expect("no-op succeeds").is_empty());
}

#[tokio::test]
async fn health_check_finds_model() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "all-minilm:l6-v2", "size": 45_000_000u64}]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 384, 16)).expect("client builds");
    client.health_check().expect("model is listed");
}

#[tokio::test]
async fn health_check_reports_missing_model() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "nomic-embed-text:latest"}]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 384, 16)).expect("client builds");
    let error = client.health_check().expect_err("model is missing");
    assert!(error.to_string().contains("all-minilm:l6-v2"));
}
