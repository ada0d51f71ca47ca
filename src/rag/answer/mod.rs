
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::RagError;
use crate::database::SearchResult;
use crate::llm::{ChatMessage, ChatModel};
use crate::rag::retriever::{DEFAULT_TOP_K, Retriever, join_context};

/// Reply the model is told to give when the context lacks the answer.
/// Advisory only; model output is returned unchecked.
pub const FALLBACK_ANSWER: &str =
    "I don't have enough information in the documents to answer that.";

/// Answer text plus the chunks it was grounded on
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Source {
    pub source_path: String,
    pub page_number: u32,
    pub content_type: String,
    pub score: f32,
}

impl From<&SearchResult> for Source {
    #[inline]
    fn from(result: &SearchResult) -> Self {
        Self {
            source_path: result.metadata.source_path.clone(),
            page_number: result.metadata.page_number,
            content_type: result.metadata.content_type.to_string(),
            score: result.similarity_score,
        }
    }
}

#[inline]
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful AI Assistant. Use the provided context to answer the user's question.\n\
         If the context doesn't contain the answer, say \"{FALLBACK_ANSWER}\"\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question: {question}\n\
         \n\
         Answer:\n"
    )
}

/// Retrieval followed by one chat completion
#[derive(Clone)]
pub struct AnswerGenerator {
    retriever: Retriever,
    model: Arc<dyn ChatModel>,
    temperature: f32,
    top_k: usize,
}

impl AnswerGenerator {
    #[inline]
    pub fn new(retriever: Retriever, model: Arc<dyn ChatModel>, temperature: f32) -> Self {
        Self {
            retriever,
            model,
            temperature,
            top_k: DEFAULT_TOP_K,
        }
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[inline]
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    #[inline]
    pub async fn answer(&self, query: &str) -> Result<String, RagError> {
        self.answer_with_sources(query).await.map(|answer| answer.text)
    }

    /// Any failure, retrieval included, is a `Generation` error
    #[inline]
    pub async fn answer_with_sources(&self, query: &str) -> Result<Answer, RagError> {
        let results = self
            .retriever
            .retrieve(query, self.top_k)
            .await
            .map_err(|e| {
                error!("Retrieval failed for question: {}", e);
                RagError::Generation(format!("Could not retrieve context: {}", e))
            })?;

        let prompt = build_prompt(&join_context(&results), query);
        debug!(
            "Prompt built from {} chunks ({} chars)",
            results.len(),
            prompt.len()
        );

        let text = self
            .model
            .complete(&[ChatMessage::user(prompt)], Some(self.temperature))
            .map_err(|e| {
                error!("Answer generation failed: {:#}", e);
                RagError::Generation(format!("{:#}", e))
            })?;

        info!(
            "Generated answer with {} ({} chars)",
            self.model.model_name(),
            text.len()
        );

        Ok(Answer {
            text,
            sources: results.iter().map(Source::from).collect(),
        })
    }
}
