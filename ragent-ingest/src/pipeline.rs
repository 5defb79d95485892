//! The full ingestion run: load, split, and index.

use crate::chunk::RecursiveSplitter;
use crate::error::Result;
use crate::indexer::{IndexOptions, IndexResult, index};
use crate::loader::load_documents;
use crate::record_manager::RecordManager;
use ragent_core::config::IngestConfig;
use ragent_core::store::SqliteVectorStore;
use tracing::info;

/// What one ingestion run read and what indexing did with it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    pub documents: usize,
    pub chunks: usize,
    pub result: IndexResult,
}

/// Ingest `config.docs_dir` into `store` using `cl100k_base` token chunking.
pub async fn run_ingestion(
    config: &IngestConfig,
    store: &SqliteVectorStore,
    force_update: bool,
) -> Result<IngestionSummary> {
    let splitter = RecursiveSplitter::from_tiktoken(config.chunk_size, config.chunk_overlap)?;
    ingest_with(config, &splitter, store, force_update).await
}

/// Ingest with an explicit splitter.
pub async fn ingest_with(
    config: &IngestConfig,
    splitter: &RecursiveSplitter,
    store: &SqliteVectorStore,
    force_update: bool,
) -> Result<IngestionSummary> {
    info!(dir = %config.docs_dir.display(), "Starting ingestion");

    let documents = load_documents(&config.docs_dir, &config.extensions).await?;
    if documents.is_empty() {
        info!("No documents found");
        return Ok(IngestionSummary::default());
    }

    let chunks = splitter.split_documents(&documents);
    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        "Split documents into chunks"
    );

    let records = RecordManager::for_store(store);
    records.create_schema().await?;

    let options = IndexOptions {
        batch_size: config.batch_size,
        force_update,
    };
    let result = index(&chunks, store, &records, &options).await?;
    Ok(IngestionSummary {
        documents: documents.len(),
        chunks: chunks.len(),
        result,
    })
}
