#[cfg(test)]
mod tests;

use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::RagError;
use crate::database::{ChunkMetadata, ContentType, DocumentChunk, VectorRecord, VectorStore};
use crate::embeddings::{ChunkingConfig, Embedder, split_pages};
use crate::llm::Captioner;
use crate::pdf;

/// Counts from one ingestion run
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct IngestReport {
    pub source_path: String,
    pub pages: usize,
    pub text_chunks: usize,
    pub images_found: usize,
    /// Images that produced a caption; never more than `images_found`
    pub image_chunks: usize,
    pub records_written: usize,
}

/// Extract, chunk, caption, embed and store one PDF
#[derive(Clone)]
pub struct IngestionPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<VectorStore>,
    captioner: Captioner,
    chunking: ChunkingConfig,
}

impl IngestionPipeline {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<VectorStore>,
        captioner: Captioner,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            captioner,
            chunking,
        }
    }

    /// Boolean form of [`Self::ingest_document`]; the failure is logged
    #[inline]
    pub async fn ingest<P: AsRef<Path>>(&self, path: P) -> bool {
        match self.ingest_document(path.as_ref()).await {
            Ok(_) => true,
            Err(e) => {
                error!("Ingestion of {} failed: {}", path.as_ref().display(), e);
                false
            }
        }
    }

    /// Nothing is written unless every chunk was embedded
    #[inline]
    pub async fn ingest_document<P: AsRef<Path>>(&self, path: P) -> Result<IngestReport, RagError> {
        let path = path.as_ref();
        let source_path = path.to_string_lossy().into_owned();
        info!("Processing {}", source_path);

        let extracted = pdf::extract(path)?;

        let mut chunks = split_pages(&extracted.pages, &source_path, &self.chunking);
        let text_chunks = chunks.len();
        debug!("Split {} pages into {} text chunks", extracted.page_count(), text_chunks);

        let image_chunks = self.caption_images(&extracted.images, &source_path);
        let captioned = image_chunks.len();
        if captioned > 0 {
            info!("Added {} image captions", captioned);
        }
        chunks.extend(image_chunks);

        let records = self.embed_chunks(chunks)?;
        let records_written = self.store.upsert_batch(&records).await?;

        let report = IngestReport {
            source_path,
            pages: extracted.page_count(),
            text_chunks,
            images_found: extracted.images.len(),
            image_chunks: captioned,
            records_written,
        };
        info!("Ingestion complete: {:?}", report);
        Ok(report)
    }

    /// Images are captioned one after another; failed captions are dropped
    fn caption_images(&self, images: &[pdf::ExtractedImage], source_path: &str) -> Vec<DocumentChunk> {
        images
            .iter()
            .enumerate()
            .filter_map(|(index, image)| {
                debug!(
                    "Captioning image {} of {} on page {}",
                    index + 1,
                    images.len(),
                    image.page_number
                );
                let caption = self.captioner.caption(&image.bytes, image.mime_type)?;
                Some(DocumentChunk {
                    text: caption.chunk_text(),
                    metadata: ChunkMetadata {
                        source_path: source_path.to_string(),
                        page_number: image.page_number,
                        content_type: ContentType::Image,
                    },
                })
            })
            .collect()
    }

    fn embed_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<Vec<VectorRecord>, RagError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_documents(&texts)
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "Expected {} embeddings, received {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let created_at = Utc::now().to_rfc3339();
        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorRecord {
                id: Uuid::new_v4().to_string(),
                vector,
                text: chunk.text,
                metadata: chunk.metadata,
                created_at: created_at.clone(),
            })
            .collect())
    }
}
