//! Error types for the Ragent core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the completion and embedding capabilities, the vector collection,
//! configuration, and the turn graph itself.

/// Top-level error type for the Ragent core library.
#[derive(Debug, thiserror::Error)]
pub enum RagentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions (completion and embedding calls).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from the vector collection.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open vector database at {path}: {message}")]
    Open { path: String, message: String },

    #[error("Vector query failed: {message}")]
    Query { message: String },

    #[error("Collection not found: {name}")]
    CollectionMissing { name: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding failed: {0}")]
    Embedding(#[from] LlmError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Query {
            message: e.to_string(),
        }
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unsupported LLM provider: '{value}' (expected 'openai' or 'gemini')")]
    UnsupportedProvider { value: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

/// Errors raised by the turn graph itself rather than by a capability.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Prompt template '{name}' failed to render: {message}")]
    Template { name: String, message: String },

    #[error("Turn exceeded {limit} graph steps")]
    StepLimitExceeded { limit: usize },
}

/// A type alias for results using the top-level `RagentError`.
pub type Result<T> = std::result::Result<T, RagentError>;
