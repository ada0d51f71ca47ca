// Shared fixtures: wiremock stand-ins for Ollama and Groq, and generated PDFs

#![allow(dead_code, reason = "each test binary uses a different subset")]

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};
use pdf_rag::config::{ApiKeys, Config};
use serde_json::{Value, json};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const DIMENSION: usize = 256;
pub const FALLBACK: &str = "I don't have enough information in the documents to answer that.";

/// Deterministic bag-of-words vector
pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSION];
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        vector[(hasher.finish() % DIMENSION as u64) as usize] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        vector[DIMENSION - 1] = 1.0;
    } else {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

/// Answers `/api/embed` like Ollama does
struct EmbedResponder;

impl Respond for EmbedResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .map(|inputs| {
                inputs
                    .iter()
                    .map(|input| hash_embed(input.as_str().unwrap_or_default()))
                    .collect()
            })
            .unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(json!({
            "model": body["model"],
            "embeddings": embeddings,
        }))
    }
}

pub async fn start_ollama() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(EmbedResponder)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "all-minilm:l6-v2", "size": 45_960_996u64}]
        })))
        .mount(&server)
        .await;
    server
}

pub async fn start_failing_ollama() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model failed to load"))
        .mount(&server)
        .await;
    server
}

/// How the fake vision model behaves
#[derive(Clone, Copy)]
pub enum Vision {
    Caption(&'static str),
    Fail,
}

/// Answers chat completions: image requests get a caption (or an error),
/// text requests echo the prompt context or give the fallback sentence
struct CompletionResponder {
    vision: Vision,
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    }))
}

impl Respond for CompletionResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let content = &body["messages"][0]["content"];

        if content.is_array() {
            return match self.vision {
                Vision::Caption(caption) => completion(caption),
                Vision::Fail => ResponseTemplate::new(429).set_body_json(json!({
                    "error": {"message": "Rate limit reached", "type": "tokens"}
                })),
            };
        }

        let prompt = content.as_str().unwrap_or_default();
        let context = prompt
            .split("Context:")
            .nth(1)
            .and_then(|rest| rest.split("Question:").next())
            .unwrap_or_default()
            .trim();
        if context.is_empty() {
            completion(FALLBACK)
        } else {
            completion(&format!("According to the documents: {}", context))
        }
    }
}

pub async fn start_groq(vision: Vision) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(CompletionResponder { vision })
        .mount(&server)
        .await;
    server
}

/// Every completion request gets the same text back
pub async fn start_groq_answering(answer: &'static str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(completion(answer))
        .mount(&server)
        .await;
    server
}

pub async fn start_failing_groq() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {"message": "Service unavailable"}
        })))
        .mount(&server)
        .await;
    server
}

/// Configuration pointing every remote service at the given mocks
pub fn config_for(dir: &Path, ollama: &MockServer, groq: &MockServer) -> Config {
    let ollama_url = Url::parse(&ollama.uri()).expect("ollama uri");
    let mut config = Config {
        base_dir: dir.to_path_buf(),
        api_keys: ApiKeys {
            groq: Some("test-key".to_string()),
            groq_vision: None,
        },
        ..Config::default()
    };
    config.ollama.host = ollama_url.host_str().expect("host").to_string();
    config.ollama.port = ollama_url.port().expect("port");
    config.ollama.embedding_dimension = DIMENSION as u32;
    config.ollama.timeout_seconds = 10;
    config.llm.base_url = format!("{}/openai/v1/", groq.uri());
    config.llm.timeout_seconds = 10;
    config
}

/// One page per entry with the given text and number of embedded images
pub fn write_pdf(dir: &TempDir, name: &str, pages: &[(&str, usize)]) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids: Vec<Object> = Vec::new();
    for (page_index, (text, images)) in pages.iter().enumerate() {
        let mut xobjects = Dictionary::new();
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 11.into()]),
            Operation::new("Td", vec![50.into(), 750.into()]),
            Operation::new("Tj", vec![Object::string_literal(*text)]),
            Operation::new("ET", vec![]),
        ];

        for image_index in 0..*images {
            let name = format!("Im{}", image_index);
            let bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, page_index as u8, image_index as u8, 0xFF, 0xD9];
            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => 1,
                    "Height" => 1,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                bytes,
            ));
            xobjects.set(name.clone(), image_id);
            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new(
                "cm",
                vec![100.into(), 0.into(), 0.into(), 100.into(), 50.into(), 500.into()],
            ));
            operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
            operations.push(Operation::new("Q", vec![]));
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content encodes"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = dir.path().join(name);
    doc.save(&path).expect("pdf saves");
    path
}
