// Embeddings module
// Text chunking and the embedding model client

pub mod chunking;
pub mod ollama;

use anyhow::Result;

pub use chunking::{ChunkingConfig, split_pages, split_text};
pub use ollama::{DEFAULT_EMBEDDING_DIMENSION, OllamaClient};

/// Turns text into vectors. Ingestion and retrieval must share one instance
/// so queries and documents live in the same embedding space.
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding model returned no vector for query"))
    }
}
