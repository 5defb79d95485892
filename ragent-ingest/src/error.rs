//! Error types for the ingestion pipeline.

use ragent_core::error::{RagentError, StoreError};

/// Errors raised while loading, splitting, or indexing documents.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Core(#[from] RagentError),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("Record manager error: {0}")]
    Record(#[from] rusqlite::Error),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Tokenizer unavailable: {message}")]
    Tokenizer { message: String },

    #[error("Chunk {index} has no '{key}' metadata")]
    MissingSourceId { index: usize, key: String },

    #[error("Invalid splitter settings: {message}")]
    InvalidSplitter { message: String },

    #[error("Record manager failure: {message}")]
    RecordManager { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
