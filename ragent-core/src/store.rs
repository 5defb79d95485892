//! Vector collection backed by SQLite.
//!
//! Every collection lives in one database file: `collections` names them and
//! records their embedding width, `embeddings` holds the rows with vectors
//! stored as little-endian `f32` blobs. Search is an exact cosine scan over
//! the collection, which is adequate for document sets of a few thousand
//! chunks.

use crate::embeddings::Embedder;
use crate::error::StoreError;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// A stored text chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Cosine similarity to the query (0.0 for stores that do not score).
    pub score: f32,
}

impl Passage {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Map::new(),
            score: 0.0,
        }
    }

    /// The `source` metadata value, if any.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// A chunk to be embedded and written to a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Similarity search over one named collection.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return at most `k` passages ordered by descending similarity to `query`.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>, StoreError>;

    /// Name of the collection being searched.
    fn collection_name(&self) -> &str;
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS collections (
    name        TEXT PRIMARY KEY,
    dimensions  INTEGER,
    created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS embeddings (
    id          TEXT NOT NULL,
    collection  TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    content     TEXT NOT NULL,
    metadata    TEXT NOT NULL DEFAULT '{}',
    embedding   BLOB NOT NULL,
    PRIMARY KEY (collection, id)
);
";

/// SQLite-backed vector collection.
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
    collection: String,
    embedder: Arc<dyn Embedder>,
    path: Option<PathBuf>,
}

impl SqliteVectorStore {
    /// Open (creating if needed) the database at `path` and bind to `collection`.
    pub fn open(
        path: &Path,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Open {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        }
        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::with_connection(conn, collection, embedder, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: ":memory:".to_string(),
            message: e.to_string(),
        })?;
        Self::with_connection(conn, collection, embedder, None)
    }

    fn with_connection(
        conn: Connection,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        path: Option<PathBuf>,
    ) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            collection: collection.into(),
            embedder,
            path,
        })
    }

    /// Database file, or `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Shared handle to the underlying connection.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Query {
                message: "vector store connection lock poisoned".to_string(),
            })?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Query {
            message: format!("blocking task failed: {e}"),
        })?
    }

    /// Create the collection row if it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<(), StoreError> {
        let name = self.collection.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO collections (name) VALUES (?1)",
                params![name],
            )?;
            Ok(())
        })
        .await
    }

    /// Whether the bound collection exists.
    pub async fn collection_exists(&self) -> Result<bool, StoreError> {
        let name = self.collection.clone();
        self.with_conn(move |conn| collection_dimensions(conn, &name).map(|d| d.is_some()))
            .await
    }

    /// Embed `documents` and write them, replacing rows with the same id.
    ///
    /// Creates the collection on first write and fixes its embedding width.
    pub async fn add_documents(&self, documents: &[Document]) -> Result<usize, StoreError> {
        if documents.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != documents.len() {
            return Err(StoreError::Query {
                message: format!(
                    "embedder returned {} vectors for {} documents",
                    vectors.len(),
                    documents.len()
                ),
            });
        }

        let name = self.collection.clone();
        let rows: Vec<(Document, Vec<f32>)> = documents.iter().cloned().zip(vectors).collect();
        let written = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO collections (name) VALUES (?1)",
                    params![name],
                )?;
                let mut dims = collection_dimensions(&tx, &name)?.flatten();
                for (doc, vector) in &rows {
                    match dims {
                        Some(expected) if expected != vector.len() => {
                            return Err(StoreError::DimensionMismatch {
                                expected,
                                actual: vector.len(),
                            });
                        }
                        Some(_) => {}
                        None => {
                            tx.execute(
                                "UPDATE collections SET dimensions = ?1 WHERE name = ?2",
                                params![vector.len() as i64, name],
                            )?;
                            dims = Some(vector.len());
                        }
                    }
                    let metadata = serde_json::to_string(&doc.metadata).map_err(|e| {
                        StoreError::Query {
                            message: format!("metadata serialization failed: {e}"),
                        }
                    })?;
                    tx.execute(
                        "INSERT OR REPLACE INTO embeddings (id, collection, content, metadata, embedding)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![doc.id, name, doc.content, metadata, encode_vector(vector)],
                    )?;
                }
                tx.commit()?;
                Ok(rows.len())
            })
            .await?;

        debug!(collection = %self.collection, written, "Wrote documents");
        Ok(written)
    }

    /// Delete rows by id. Returns how many existed.
    pub async fn delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let name = self.collection.clone();
        let ids = ids.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt =
                    tx.prepare("DELETE FROM embeddings WHERE collection = ?1 AND id = ?2")?;
                for id in &ids {
                    removed += stmt.execute(params![name, id])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    /// Number of rows in the collection.
    pub async fn count(&self) -> Result<usize, StoreError> {
        let name = self.collection.clone();
        self.with_conn(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM embeddings WHERE collection = ?1",
                params![name],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
        .await
    }
}

/// `None` when the collection is missing, `Some(None)` when it has no width yet.
fn collection_dimensions(conn: &Connection, name: &str) -> Result<Option<Option<usize>>, StoreError> {
    let row: Option<Option<i64>> = conn
        .query_row(
            "SELECT dimensions FROM collections WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(row.map(|d| d.map(|d| d as usize)))
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>, StoreError> {
        let name = self.collection.clone();
        let dims = self
            .with_conn({
                let name = name.clone();
                move |conn| collection_dimensions(conn, &name)
            })
            .await?
            .ok_or_else(|| StoreError::CollectionMissing { name: name.clone() })?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_query(query).await?;
        if let Some(expected) = dims
            && expected != query_vector.len()
        {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: query_vector.len(),
            });
        }

        let mut scored = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, content, metadata, embedding FROM embeddings WHERE collection = ?1",
                )?;
                let rows = stmt.query_map(params![name], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                    ))
                })?;
                let mut passages = Vec::new();
                for row in rows {
                    let (id, content, metadata, blob) = row?;
                    let metadata: Map<String, Value> = match serde_json::from_str(&metadata) {
                        Ok(metadata) => metadata,
                        Err(e) => {
                            warn!(id = %id, error = %e, "Unreadable passage metadata, ignoring it");
                            Map::new()
                        }
                    };
                    let score = cosine_similarity(&query_vector, &decode_vector(&blob));
                    passages.push(Passage {
                        id,
                        content,
                        metadata,
                        score,
                    });
                }
                Ok(passages)
            })
            .await?;

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        info!(
            collection = %self.collection,
            passages = scored.len(),
            top_score = scored.first().map(|p| p.score).unwrap_or(0.0),
            "Similarity search complete"
        );
        Ok(scored)
    }

    fn collection_name(&self) -> &str {
        &self.collection
    }
}

/// A fixed list of passages, returned in order regardless of the query.
///
/// Records every query it receives.
pub struct StaticVectorStore {
    passages: Vec<Passage>,
    queries: Mutex<Vec<String>>,
    fail_with_missing: bool,
}

impl StaticVectorStore {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self {
            passages,
            queries: Mutex::new(Vec::new()),
            fail_with_missing: false,
        }
    }

    /// Build a store from plain passage texts.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            texts
                .into_iter()
                .enumerate()
                .map(|(i, t)| Passage::new(format!("p{i}"), t))
                .collect(),
        )
    }

    /// A store whose every search fails with `CollectionMissing`.
    pub fn missing() -> Self {
        Self {
            passages: Vec::new(),
            queries: Mutex::new(Vec::new()),
            fail_with_missing: true,
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for StaticVectorStore {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>, StoreError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        if self.fail_with_missing {
            return Err(StoreError::CollectionMissing {
                name: self.collection_name().to_string(),
            });
        }
        Ok(self.passages.iter().take(k).cloned().collect())
    }

    fn collection_name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::LocalEmbedder;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(id: &str, content: &str, source: &str) -> Document {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!(source));
        Document {
            id: id.to_string(),
            content: content.to_string(),
            metadata,
        }
    }

    fn store() -> SqliteVectorStore {
        SqliteVectorStore::open_in_memory("internal_docs", Arc::new(LocalEmbedder::new(64)))
            .unwrap()
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_vector_blob_encoding() {
        let v = vec![0.25f32, -1.5, 3.0];
        let bytes = encode_vector(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(decode_vector(&bytes), v);
    }

    #[tokio::test]
    async fn test_search_missing_collection() {
        let store = store();
        let err = store.search("anything", 3).await.unwrap_err();
        match err {
            StoreError::CollectionMissing { name } => assert_eq!(name, "internal_docs"),
            other => panic!("Expected CollectionMissing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_empty_collection() {
        let store = store();
        store.ensure_collection().await.unwrap();
        assert!(store.collection_exists().await.unwrap());
        assert!(store.search("anything", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_and_search_ranks_by_similarity() {
        let store = store();
        store
            .add_documents(&[
                doc("a", "vacation request procedure", "docs/hr.md"),
                doc("b", "expense report deadline", "docs/finance.md"),
                doc("c", "vacation days carry over", "docs/hr.md"),
                doc("d", "office wifi password", "docs/it.md"),
            ])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 4);

        let results = store.search("vacation request", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[0].source(), Some("docs/hr.md"));
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_search_k_larger_than_collection() {
        let store = store();
        store
            .add_documents(&[doc("a", "one", "s"), doc("b", "two", "s")])
            .await
            .unwrap();
        assert_eq!(store.search("one", 10).await.unwrap().len(), 2);
        assert!(store.search("one", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_replaces_same_id() {
        let store = store();
        store.add_documents(&[doc("a", "old", "s")]).await.unwrap();
        store.add_documents(&[doc("a", "new", "s")]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        let results = store.search("new", 1).await.unwrap();
        assert_eq!(results[0].content, "new");
    }

    #[tokio::test]
    async fn test_delete() {
        let store = store();
        store
            .add_documents(&[doc("a", "one", "s"), doc("b", "two", "s")])
            .await
            .unwrap();
        let removed = store
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");
        let small = SqliteVectorStore::open(&path, "c", Arc::new(LocalEmbedder::new(8))).unwrap();
        small.add_documents(&[doc("a", "one", "s")]).await.unwrap();
        drop(small);

        let large = SqliteVectorStore::open(&path, "c", Arc::new(LocalEmbedder::new(16))).unwrap();
        let err = large.add_documents(&[doc("b", "two", "s")]).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 8,
                actual: 16
            }
        ));
        let err = large.search("one", 1).await.unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vectors.db");
        let embedder: Arc<dyn Embedder> = Arc::new(LocalEmbedder::new(32));
        let a = SqliteVectorStore::open(&path, "a", embedder.clone()).unwrap();
        let b = SqliteVectorStore::open(&path, "b", embedder).unwrap();
        a.add_documents(&[doc("x", "alpha", "s")]).await.unwrap();
        assert_eq!(a.count().await.unwrap(), 1);
        assert!(matches!(
            b.search("alpha", 1).await,
            Err(StoreError::CollectionMissing { .. })
        ));
        assert_eq!(a.path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_corrupt_metadata_keeps_passage() {
        let store = store();
        store
            .add_documents(&[doc("a", "leave requests", "a.md")])
            .await
            .unwrap();
        {
            let conn = store.connection();
            let conn = conn.lock().unwrap();
            conn.execute("UPDATE embeddings SET metadata = '{not json' WHERE id = 'a'", [])
                .unwrap();
        }
        let hits = store.search("leave requests", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "leave requests");
        assert!(hits[0].metadata.is_empty());
    }

    #[tokio::test]
    async fn test_static_store() {
        let store = StaticVectorStore::from_texts(["one", "two", "three", "four"]);
        let results = store.search("q", 3).await.unwrap();
        assert_eq!(
            results.iter().map(|p| p.content.as_str()).collect::<Vec<_>>(),
            vec!["one", "two", "three"]
        );
        assert_eq!(store.queries(), vec!["q".to_string()]);

        let missing = StaticVectorStore::missing();
        assert!(missing.search("q", 3).await.is_err());
    }
}
