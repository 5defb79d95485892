//! Bookkeeping of which chunk keys each ingestion run wrote.
//!
//! Lives in the same SQLite database as the vector collection. Each record
//! is a key, the source it came from, and when a run last touched it.

use crate::error::{IngestError, Result};
use ragent_core::store::SqliteVectorStore;
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::{Arc, Mutex};
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS upsertion_record (
    namespace   TEXT NOT NULL,
    key         TEXT NOT NULL,
    group_id    TEXT,
    updated_at  INTEGER NOT NULL,
    PRIMARY KEY (namespace, key)
);
CREATE INDEX IF NOT EXISTS idx_upsertion_record_group
    ON upsertion_record (namespace, group_id);
CREATE INDEX IF NOT EXISTS idx_upsertion_record_updated
    ON upsertion_record (namespace, updated_at);
";

/// Records of keys written under one namespace.
#[derive(Clone)]
pub struct RecordManager {
    conn: Arc<Mutex<Connection>>,
    namespace: String,
}

impl RecordManager {
    pub fn new(conn: Arc<Mutex<Connection>>, namespace: impl Into<String>) -> Self {
        Self {
            conn,
            namespace: namespace.into(),
        }
    }

    /// A manager sharing `store`'s database, namespaced `sqlite/{collection}`.
    pub fn for_store(store: &SqliteVectorStore) -> Self {
        use ragent_core::store::VectorStore;
        Self::new(
            store.connection(),
            format!("sqlite/{}", store.collection_name()),
        )
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &str) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let namespace = self.namespace.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| IngestError::RecordManager {
                message: "record manager connection lock poisoned".to_string(),
            })?;
            f(&mut *guard, &namespace)
        })
        .await
        .map_err(|e| IngestError::RecordManager {
            message: format!("blocking task failed: {e}"),
        })?
    }

    /// Create the record table. Safe to call repeatedly.
    pub async fn create_schema(&self) -> Result<()> {
        self.with_conn(|conn, _| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
    }

    /// Current time in microseconds, strictly after every timestamp already
    /// recorded in this namespace.
    pub async fn get_time(&self) -> Result<i64> {
        self.with_conn(|conn, namespace| {
            let latest: Option<i64> = conn
                .query_row(
                    "SELECT MAX(updated_at) FROM upsertion_record WHERE namespace = ?1",
                    params![namespace],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();
            let now = chrono::Utc::now().timestamp_micros();
            Ok(latest.map_or(now, |l| now.max(l + 1)))
        })
        .await
    }

    /// Insert or refresh `keys`, stamping them no earlier than `time_at_least`.
    /// `group_ids` is parallel to `keys`.
    pub async fn update(
        &self,
        keys: &[String],
        group_ids: &[Option<String>],
        time_at_least: i64,
    ) -> Result<()> {
        if keys.len() != group_ids.len() {
            return Err(IngestError::RecordManager {
                message: format!(
                    "{} keys but {} group ids",
                    keys.len(),
                    group_ids.len()
                ),
            });
        }
        if keys.is_empty() {
            return Ok(());
        }
        let rows: Vec<(String, Option<String>)> =
            keys.iter().cloned().zip(group_ids.iter().cloned()).collect();
        self.with_conn(move |conn, namespace| {
            let stamp = chrono::Utc::now().timestamp_micros().max(time_at_least);
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO upsertion_record (namespace, key, group_id, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (namespace, key)
                     DO UPDATE SET group_id = excluded.group_id, updated_at = excluded.updated_at",
                )?;
                for (key, group) in &rows {
                    stmt.execute(params![namespace, key, group, stamp])?;
                }
            }
            tx.commit()?;
            debug!(namespace, records = rows.len(), "Records updated");
            Ok(())
        })
        .await
    }

    /// Whether each key is recorded, in input order.
    pub async fn exists(&self, keys: &[String]) -> Result<Vec<bool>> {
        let keys = keys.to_vec();
        self.with_conn(move |conn, namespace| {
            let mut stmt = conn.prepare(
                "SELECT 1 FROM upsertion_record WHERE namespace = ?1 AND key = ?2",
            )?;
            let mut found = Vec::with_capacity(keys.len());
            for key in &keys {
                found.push(stmt.exists(params![namespace, key])?);
            }
            Ok(found)
        })
        .await
    }

    /// Keys updated strictly before `before` (when given) that belong to one
    /// of `group_ids` (when given).
    pub async fn list_keys(
        &self,
        before: Option<i64>,
        group_ids: Option<&[String]>,
    ) -> Result<Vec<String>> {
        let groups = group_ids.map(<[String]>::to_vec);
        self.with_conn(move |conn, namespace| {
            let mut stmt = conn.prepare(
                "SELECT key, group_id, updated_at FROM upsertion_record
                 WHERE namespace = ?1 ORDER BY key",
            )?;
            let rows = stmt.query_map(params![namespace], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;
            let mut keys = Vec::new();
            for row in rows {
                let (key, group, updated_at) = row?;
                if before.is_some_and(|b| updated_at >= b) {
                    continue;
                }
                if let Some(groups) = &groups
                    && !group.as_ref().is_some_and(|g| groups.contains(g))
                {
                    continue;
                }
                keys.push(key);
            }
            Ok(keys)
        })
        .await
    }

    /// Remove records for `keys`. Returns how many existed.
    pub async fn delete_keys(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let keys = keys.to_vec();
        self.with_conn(move |conn, namespace| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt = tx
                    .prepare("DELETE FROM upsertion_record WHERE namespace = ?1 AND key = ?2")?;
                for key in &keys {
                    removed += stmt.execute(params![namespace, key])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ragent_core::embeddings::LocalEmbedder;

    fn manager(namespace: &str) -> RecordManager {
        let conn = Connection::open_in_memory().unwrap();
        RecordManager::new(Arc::new(Mutex::new(conn)), namespace)
    }

    fn keys(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_create_schema_is_idempotent() {
        let rm = manager("sqlite/test");
        rm.create_schema().await.unwrap();
        rm.create_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_exists_and_delete() {
        let rm = manager("sqlite/test");
        rm.create_schema().await.unwrap();
        let start = rm.get_time().await.unwrap();
        rm.update(
            &keys(&["k1", "k2"]),
            &[Some("a.md".into()), Some("b.md".into())],
            start,
        )
        .await
        .unwrap();

        assert_eq!(
            rm.exists(&keys(&["k1", "k3", "k2"])).await.unwrap(),
            vec![true, false, true]
        );
        assert_eq!(rm.delete_keys(&keys(&["k1", "k3"])).await.unwrap(), 1);
        assert_eq!(rm.exists(&keys(&["k1"])).await.unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_list_keys_filters_by_time_and_group() {
        let rm = manager("sqlite/test");
        rm.create_schema().await.unwrap();
        let first = rm.get_time().await.unwrap();
        rm.update(
            &keys(&["old-a", "old-b"]),
            &[Some("a.md".into()), Some("b.md".into())],
            first,
        )
        .await
        .unwrap();

        let second = rm.get_time().await.unwrap();
        assert!(second > first);
        rm.update(&keys(&["new-a"]), &[Some("a.md".into())], second)
            .await
            .unwrap();

        let stale_a = rm
            .list_keys(Some(second), Some(&keys(&["a.md"])))
            .await
            .unwrap();
        assert_eq!(stale_a, keys(&["old-a"]));
        assert_eq!(rm.list_keys(None, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let a = RecordManager::new(conn.clone(), "sqlite/a");
        let b = RecordManager::new(conn, "sqlite/b");
        a.create_schema().await.unwrap();
        let t = a.get_time().await.unwrap();
        a.update(&keys(&["k"]), &[None], t).await.unwrap();
        assert_eq!(b.exists(&keys(&["k"])).await.unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_for_store_namespace() {
        let store =
            SqliteVectorStore::open_in_memory("internal_docs", Arc::new(LocalEmbedder::new(8)))
                .unwrap();
        let rm = RecordManager::for_store(&store);
        assert_eq!(rm.namespace(), "sqlite/internal_docs");
        rm.create_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_mismatched_group_ids() {
        let rm = manager("sqlite/test");
        rm.create_schema().await.unwrap();
        let err = rm.update(&keys(&["k"]), &[], 0).await.unwrap_err();
        assert!(matches!(err, IngestError::RecordManager { .. }));
    }
}
