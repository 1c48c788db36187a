//! Core data models used throughout Igris.
//!
//! These types represent the content blocks and chunks that flow through the
//! ingestion pipeline, and the search hits returned from the vector index.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Text extracted from one file (or one PDF page) by the document loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    pub text: String,
    pub source: PathBuf,
    /// 1-based page number, set for PDF pages only.
    pub page: Option<u32>,
}

/// Citation metadata carried by every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Position of the chunk within its content block, starting at 0.
    pub chunk_index: u32,
}

/// A bounded segment of a content block, the unit of indexing and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A search result returned from the vector index.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}
