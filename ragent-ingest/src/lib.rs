//! # Ragent Ingest
//!
//! Populates the vector collection the agent searches. Documents are read
//! from a directory, split into overlapping token-sized chunks, keyed by a
//! content hash, and indexed incrementally against a record of what earlier
//! runs wrote.

pub mod chunk;
pub mod error;
pub mod hashing;
pub mod indexer;
pub mod loader;
pub mod pipeline;
pub mod record_manager;

pub use chunk::{Chunk, RecursiveSplitter};
pub use error::{IngestError, Result};
pub use indexer::{IndexOptions, IndexResult, index};
pub use loader::{SourceDocument, load_documents};
pub use pipeline::{IngestionSummary, run_ingestion};
pub use record_manager::RecordManager;
