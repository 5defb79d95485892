//! Incremental indexing of chunks into the vector collection.

use crate::chunk::Chunk;
use crate::error::{IngestError, Result};
use crate::hashing::hashed_document;
use crate::loader::SOURCE_KEY;
use crate::record_manager::RecordManager;
use ragent_core::store::{Document, SqliteVectorStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

/// Counts reported by one indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResult {
    pub num_added: usize,
    pub num_updated: usize,
    pub num_deleted: usize,
    pub num_skipped: usize,
}

impl std::fmt::Display for IndexResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Added: {}, Updated: {}, Deleted: {}, Skipped: {}",
            self.num_added, self.num_updated, self.num_deleted, self.num_skipped
        )
    }
}

#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Chunks embedded and written per store call.
    pub batch_size: usize,
    /// Rewrite chunks that are already recorded.
    pub force_update: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            batch_size: 64,
            force_update: false,
        }
    }
}

/// Write `chunks` to `store`, skipping ones an earlier run already wrote, then
/// delete records of every source seen here that this run did not touch.
///
/// Every chunk must carry a `source` metadata value.
pub async fn index(
    chunks: &[Chunk],
    store: &SqliteVectorStore,
    records: &RecordManager,
    options: &IndexOptions,
) -> Result<IndexResult> {
    let mut result = IndexResult::default();
    let index_start = records.get_time().await?;
    let batch_size = options.batch_size.max(1);

    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut sources: BTreeSet<String> = BTreeSet::new();

    for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
        let offset = batch_no * batch_size;

        let mut documents: Vec<Document> = Vec::with_capacity(batch.len());
        let mut groups: Vec<Option<String>> = Vec::with_capacity(batch.len());
        for (i, chunk) in batch.iter().enumerate() {
            let source = chunk
                .metadata
                .get(SOURCE_KEY)
                .and_then(|v| v.as_str())
                .ok_or_else(|| IngestError::MissingSourceId {
                    index: offset + i,
                    key: SOURCE_KEY.to_string(),
                })?
                .to_string();
            let document = hashed_document(chunk)?;
            if !seen_keys.insert(document.id.clone()) {
                result.num_skipped += 1;
                continue;
            }
            sources.insert(source.clone());
            groups.push(Some(source));
            documents.push(document);
        }

        let keys: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
        let recorded = records.exists(&keys).await?;

        let mut to_write = Vec::new();
        let mut rewritten = 0usize;
        for (document, already) in documents.iter().zip(&recorded) {
            match (*already, options.force_update) {
                (true, false) => result.num_skipped += 1,
                (true, true) => {
                    rewritten += 1;
                    to_write.push(document.clone());
                }
                (false, _) => to_write.push(document.clone()),
            }
        }

        if !to_write.is_empty() {
            store.add_documents(&to_write).await?;
            result.num_added += to_write.len() - rewritten;
            result.num_updated += rewritten;
        }

        // Written and skipped keys alike are stamped as touched by this run.
        records.update(&keys, &groups, index_start).await?;
        debug!(
            batch = batch_no,
            written = to_write.len(),
            skipped = keys.len() - to_write.len(),
            "Indexed batch"
        );
    }

    if !sources.is_empty() {
        let sources: Vec<String> = sources.into_iter().collect();
        let stale = records.list_keys(Some(index_start), Some(&sources)).await?;
        if !stale.is_empty() {
            store.delete(&stale).await?;
            records.delete_keys(&stale).await?;
            result.num_deleted = stale.len();
        }
    }

    info!(
        added = result.num_added,
        updated = result.num_updated,
        deleted = result.num_deleted,
        skipped = result.num_skipped,
        "Indexing finished"
    );
    Ok(result)
}
