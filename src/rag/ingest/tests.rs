use super::*;
use crate::rag::testing::{
    HashEmbedder, StubChatModel, raster_image, test_config, test_store, write_pdf,
    write_pdf_with_images,
};
use std::sync::atomic::Ordering;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    pipeline: IngestionPipeline,
    store: Arc<VectorStore>,
    embedder: Arc<HashEmbedder>,
    vision: Arc<StubChatModel>,
}

async fn fixture(vision: Arc<StubChatModel>) -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let config = test_config(dir.path());
    let store = Arc::new(test_store(&config).await);
    let embedder = HashEmbedder::new();
    let pipeline = IngestionPipeline::new(
        embedder.clone(),
        Arc::clone(&store),
        Captioner::new(vision.clone()),
        config.chunking.clone(),
    );
    Fixture {
        dir,
        pipeline,
        store,
        embedder,
        vision,
    }
}

#[tokio::test]
async fn single_page_text_only_pdf() {
    let fx = fixture(StubChatModel::new(|_| Ok("unused".to_string()))).await;
    let path = write_pdf(&fx.dir, "resume.pdf", &[("Experience: 5 years at Acme Corp.", 0)]);

    let report = fx.pipeline.ingest_document(&path).await.expect("ingests");

    assert_eq!(report.pages, 1);
    assert_eq!(report.text_chunks, 1);
    assert_eq!(report.images_found, 0);
    assert_eq!(report.image_chunks, 0);
    assert_eq!(report.records_written, 1);
    assert_eq!(fx.store.count_records().await.expect("count"), 1);
    assert_eq!(fx.vision.prompts.lock().expect("lock").len(), 0);
}

#[tokio::test]
async fn captions_become_image_chunks() {
    let fx = fixture(StubChatModel::new(|_| Ok("A pie chart of market share.".to_string()))).await;
    let path = write_pdf(&fx.dir, "charts.pdf", &[("Quarterly results", 2)]);

    let report = fx.pipeline.ingest_document(&path).await.expect("ingests");

    assert_eq!(report.images_found, 2);
    assert_eq!(report.image_chunks, 2);
    assert_eq!(report.records_written, report.text_chunks + 2);

    let hits = fx
        .store
        .search_similar(&HashEmbedder::embed("pie chart market share"), 1)
        .await
        .expect("search");
    assert_eq!(hits[0].metadata.content_type, ContentType::Image);
    assert_eq!(hits[0].metadata.page_number, 1);
    assert_eq!(
        hits[0].text,
        "[Image/Chart Description]: A pie chart of market share."
    );
}

#[tokio::test]
async fn failed_captions_are_dropped() {
    let fx = fixture(StubChatModel::failing("HTTP 429: rate limited")).await;
    let path = write_pdf(&fx.dir, "charts.pdf", &[("Text page", 0), ("Chart page", 3)]);

    let report = fx.pipeline.ingest_document(&path).await.expect("ingestion still succeeds");

    assert_eq!(report.images_found, 3);
    assert_eq!(report.image_chunks, 0);
    assert_eq!(report.records_written, report.text_chunks);
    // One attempt per image
    assert_eq!(fx.vision.prompts.lock().expect("lock").len(), 3);
}

#[tokio::test]
async fn reingesting_duplicates_records() {
    let fx = fixture(StubChatModel::new(|_| Ok("unused".to_string()))).await;
    let path = write_pdf(&fx.dir, "resume.pdf", &[("Experience: 5 years at Acme Corp.", 0)]);

    assert!(fx.pipeline.ingest(&path).await);
    let first = fx.store.count_records().await.expect("count");
    assert!(fx.pipeline.ingest(&path).await);
    let second = fx.store.count_records().await.expect("count");

    assert_eq!(second, first * 2);
}

#[tokio::test]
async fn embedding_failure_writes_nothing() {
    let fx = fixture(StubChatModel::new(|_| Ok("caption".to_string()))).await;
    fx.embedder.fail.store(true, Ordering::SeqCst);
    let path = write_pdf(&fx.dir, "doc.pdf", &[("Some text", 1)]);

    let error = fx
        .pipeline
        .ingest_document(&path)
        .await
        .expect_err("embedding failure aborts");
    assert!(matches!(error, RagError::Embedding(_)));

    assert!(!fx.pipeline.ingest(&path).await);
    assert_eq!(fx.store.count_records().await.expect("count"), 0);
}

#[tokio::test]
async fn invalid_pdf_is_an_extraction_failure() {
    let fx = fixture(StubChatModel::new(|_| Ok("unused".to_string()))).await;
    let path = fx.dir.path().join("broken.pdf");
    std::fs::write(&path, b"%PDF-1.4 truncated").expect("write");

    let error = fx.pipeline.ingest_document(&path).await.expect_err("fails");
    assert!(matches!(error, RagError::Extraction(_)));
    assert_eq!(fx.embedder.calls.load(Ordering::SeqCst), 0);
    assert!(!fx.pipeline.ingest(&path).await);
}

#[tokio::test]
async fn long_text_is_split_within_chunk_size() {
    let fx = fixture(StubChatModel::new(|_| Ok("unused".to_string()))).await;
    let sentence = "Rust ownership rules keep memory safe without a garbage collector. ";
    let long_text = sentence.repeat(40);
    let path = write_pdf(&fx.dir, "long.pdf", &[(long_text.as_str(), 0)]);

    let report = fx.pipeline.ingest_document(&path).await.expect("ingests");

    assert!(report.text_chunks > 1);
    let hits = fx
        .store
        .search_similar(&HashEmbedder::embed("ownership"), 10)
        .await
        .expect("search");
    assert!(hits.iter().all(|hit| hit.text.chars().count() <= 1000));
}

#[tokio::test]
async fn compressed_raster_image_is_captioned_as_png() {
    let fx = fixture(StubChatModel::new(|_| Ok("A flow diagram of the build.".to_string()))).await;
    let image = raster_image(16, 16, "DeviceRGB".into(), 8, vec![0x20; 16 * 16 * 3], true);
    let path = write_pdf_with_images(&fx.dir, "diagram.pdf", vec![("Architecture", vec![image])]);

    let report = fx.pipeline.ingest_document(&path).await.expect("ingests");

    assert_eq!(report.images_found, 1);
    assert_eq!(report.image_chunks, 1);
    let urls = fx.vision.image_urls.lock().expect("lock");
    assert_eq!(urls.len(), 1);
    assert!(urls[0].starts_with("data:image/png;base64,iVBORw0KGgo"));
}
