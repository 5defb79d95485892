//! # Ragent Core
//!
//! Core library for the Ragent conversational retrieval agent.
//! Provides the completion interface (brain), embedding and vector search
//! capabilities, configuration, the turn graph with its router, and the
//! conversation loop that drives it.

pub mod brain;
pub mod capabilities;
pub mod config;
pub mod conversation;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod prompts;
pub mod providers;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Brain, LlmProvider, MockLlmProvider};
pub use capabilities::Capabilities;
pub use config::{ConfigOverrides, ProviderKind, RagentConfig, load_config};
pub use conversation::{ConversationLoop, LineOutcome};
pub use embeddings::{Embedder, LocalEmbedder};
pub use error::{ConfigError, GraphError, LlmError, RagentError, Result, StoreError};
pub use graph::{
    AnswerVerdict, Graph, GraphExecutor, GraphVariant, Node, SearchDecision, TurnOutcome,
    TurnState,
};
pub use store::{Document, Passage, SqliteVectorStore, StaticVectorStore, VectorStore};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
