// LanceDB vector database module
// Handles vector storage and similarity search for document chunks


pub mod vector_store;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use vector_store::{SearchResult, VectorStore};

/// Where a chunk's text came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
}

impl ContentType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for ContentType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            other => Err(format!("unknown content type: {}", other)),
        }
    }
}

/// Metadata carried by every chunk and persisted alongside its embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Path of the ingested PDF
    pub source_path: String,
    /// 1-based page the chunk was taken from
    pub page_number: u32,
    pub content_type: ContentType,
}

/// A passage ready for embedding, produced by the chunker or the image captioner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Persisted record: a chunk plus its embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique identifier for this record (fresh per ingestion, so re-ingesting duplicates)
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// RFC 3339 timestamp of ingestion
    pub created_at: String,
}
