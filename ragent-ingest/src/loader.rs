//! Loading source documents from a directory.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Metadata key that identifies where a document came from.
pub const SOURCE_KEY: &str = "source";

/// A whole file read from the documents directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub content: String,
    pub metadata: Map<String, Value>,
}

impl SourceDocument {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Map::new();
        metadata.insert(SOURCE_KEY.to_string(), Value::String(source.into()));
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(|v| v.as_str())
    }
}

/// Files directly inside `dir` whose extension is in `extensions`, sorted by path.
pub fn list_documents(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)));
        if matches {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Read every matching file in `dir`. The `source` metadata is the file path.
///
/// A missing directory yields no documents.
pub async fn load_documents(dir: &Path, extensions: &[String]) -> Result<Vec<SourceDocument>> {
    if !dir.is_dir() {
        info!(dir = %dir.display(), "Documents directory does not exist");
        return Ok(Vec::new());
    }

    let files = list_documents(dir, extensions)?;
    info!(count = files.len(), dir = %dir.display(), "Found documents");

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        debug!(path = %path.display(), "Loading document");
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| IngestError::Read {
                path: path.display().to_string(),
                source,
            })?;
        documents.push(SourceDocument::new(content, path.display().to_string()));
    }
    Ok(documents)
}
