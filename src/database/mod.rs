// Database module
// Vector storage for embedded document chunks

pub mod lancedb;

pub use self::lancedb::{
    ChunkMetadata, ContentType, DocumentChunk, SearchResult, VectorRecord, VectorStore,
};
