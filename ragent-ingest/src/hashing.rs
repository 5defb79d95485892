//! Content-addressed keys for chunks.

use crate::chunk::Chunk;
use crate::error::Result;
use ragent_core::store::Document;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Hex-encoded SHA-256 of `input`.
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Metadata serialized with keys in sorted order at every level.
pub fn canonical_metadata(metadata: &Map<String, Value>) -> Result<String> {
    Ok(serde_json::to_string(&sorted(&Value::Object(metadata.clone())))?)
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, sorted(v))).collect();
            serde_json::to_value(ordered).unwrap_or(Value::Null)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Record key for a chunk: the hash of its content hash joined with its
/// metadata hash. Identical text from two sources gets two keys.
pub fn chunk_key(content: &str, metadata: &Map<String, Value>) -> Result<String> {
    let content_hash = sha256_hex(content);
    let metadata_hash = sha256_hex(&canonical_metadata(metadata)?);
    Ok(sha256_hex(&format!("{content_hash}{metadata_hash}")))
}

/// The store document for a chunk, keyed by [`chunk_key`].
pub fn hashed_document(chunk: &Chunk) -> Result<Document> {
    Ok(Document {
        id: chunk_key(&chunk.content, &chunk.metadata)?,
        content: chunk.content.clone(),
        metadata: chunk.metadata.clone(),
    })
}
