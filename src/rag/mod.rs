// Retrieval-augmented generation engine
// Owns the embedding client, vector store and hosted models shared by every request

pub mod answer;
pub mod ingest;
pub mod retriever;

#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{SearchResult, VectorStore};
use crate::embeddings::{Embedder, OllamaClient};
use crate::llm::{Captioner, ChatModel, GroqClient};
use crate::{RagError, Result};

pub use answer::{Answer, AnswerGenerator, FALLBACK_ANSWER, Source, build_prompt};
pub use ingest::{IngestReport, IngestionPipeline};
pub use retriever::{DEFAULT_TOP_K, Retriever};

/// Process-wide service object. Construct once at startup, share by
/// reference (or `Arc`) with request handlers, and call [`Self::shutdown`]
/// when done.
pub struct RagEngine {
    config: Config,
    store: Arc<VectorStore>,
    pipeline: IngestionPipeline,
    generator: AnswerGenerator,
}

impl RagEngine {
    /// Connect to Ollama, the vector store and the hosted models
    #[inline]
    pub async fn new(config: Config) -> Result<Self> {
        let embedder = OllamaClient::new(&config.ollama)
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let store = VectorStore::new(&config).await?;

        let chat_model = GroqClient::new(
            &config.llm,
            &config.llm.chat_model,
            config.api_keys.groq.as_deref(),
        )
        .map_err(|e| RagError::Config(format!("{:#}", e)))?;

        let vision_model = GroqClient::new(
            &config.llm,
            &config.llm.vision_model,
            config.api_keys.vision(),
        )
        .map_err(|e| RagError::Config(format!("{:#}", e)))?;

        if !chat_model.has_api_key() {
            warn!("GROQ_API_KEY is not set; questions will fail until it is provided");
        }

        Ok(Self::from_parts(
            config,
            Arc::new(embedder),
            store,
            Arc::new(chat_model),
            Arc::new(vision_model),
        ))
    }

    /// Assemble an engine from already constructed collaborators
    #[inline]
    pub fn from_parts(
        config: Config,
        embedder: Arc<dyn Embedder>,
        store: VectorStore,
        chat_model: Arc<dyn ChatModel>,
        vision_model: Arc<dyn ChatModel>,
    ) -> Self {
        let store = Arc::new(store);
        let retriever = Retriever::new(Arc::clone(&embedder), Arc::clone(&store));
        let pipeline = IngestionPipeline::new(
            embedder,
            Arc::clone(&store),
            Captioner::new(vision_model),
            config.chunking.clone(),
        );
        let generator = AnswerGenerator::new(retriever, chat_model, config.llm.temperature);

        info!(
            "RAG engine ready (collection '{}')",
            store.collection_name()
        );

        Self {
            config,
            store,
            pipeline,
            generator,
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    #[inline]
    pub fn retriever(&self) -> &Retriever {
        self.generator.retriever()
    }

    #[inline]
    pub async fn ingest<P: AsRef<Path>>(&self, path: P) -> bool {
        self.pipeline.ingest(path).await
    }

    #[inline]
    pub async fn ingest_document<P: AsRef<Path>>(&self, path: P) -> Result<IngestReport> {
        self.pipeline.ingest_document(path).await
    }

    #[inline]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.retriever().retrieve(query, k).await
    }

    #[inline]
    pub async fn context(&self, query: &str, k: usize) -> Result<String> {
        self.retriever().context(query, k).await
    }

    #[inline]
    pub async fn answer(&self, query: &str) -> Result<String> {
        self.generator.answer(query).await
    }

    #[inline]
    pub async fn answer_with_sources(&self, query: &str) -> Result<Answer> {
        self.generator.answer_with_sources(query).await
    }

    /// Release the store connection and clients
    #[inline]
    pub async fn shutdown(self) {
        let records = self.store.count_records().await.ok();
        info!(
            "Shutting down RAG engine (collection '{}', {} records)",
            self.store.collection_name(),
            records.map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );
    }
}
