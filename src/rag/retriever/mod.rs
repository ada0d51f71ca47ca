
use itertools::Itertools;
use std::sync::Arc;
use tracing::debug;

use crate::RagError;
use crate::database::{SearchResult, VectorStore};
use crate::embeddings::Embedder;

pub const DEFAULT_TOP_K: usize = 5;

/// Separator between passages in an assembled context
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Nearest-neighbor lookup over the ingested chunks
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<VectorStore>,
}

impl Retriever {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Up to `k` chunks, most similar first
    #[inline]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, RagError> {
        debug!("Retrieving top {} chunks for query: {}", k, query);

        let query_vector = self
            .embedder
            .embed_query(query)
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let results = self.store.search_similar(&query_vector, k).await?;
        debug!("Retrieved {} chunks", results.len());
        Ok(results)
    }

    /// Retrieved chunk texts joined with blank lines
    #[inline]
    pub async fn context(&self, query: &str, k: usize) -> Result<String, RagError> {
        let results = self.retrieve(query, k).await?;
        Ok(join_context(&results))
    }
}

#[inline]
pub fn join_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|result| result.text.as_str())
        .join(CONTEXT_SEPARATOR)
}
