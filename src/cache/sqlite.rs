//! SQLite cache store
//!
//! Persistent backend for the result cache. Every namespace shares one table
//! keyed by `(namespace, cache_key)`. rusqlite is blocking, so each call runs
//! on the blocking pool and never stalls other requests' futures.

use super::{CacheNamespace, CacheStore};
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct SqliteCacheStore {
    path: PathBuf,
    db: Arc<Mutex<Connection>>,
}

impl SqliteCacheStore {
    /// Open or create the cache database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Connection::open(&path).map_err(|e| {
            OrchestratorError::CacheUnavailable(format!("Failed to open cache database: {}", e))
        })?;

        let store = Self {
            path,
            db: Arc::new(Mutex::new(db)),
        };
        store.init_schema()?;

        info!("Opened SQLite cache at {}", store.path.display());
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let db = self
            .db
            .lock()
            .map_err(|_| OrchestratorError::CacheUnavailable("cache connection poisoned".to_string()))?;

        db.execute(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL,
                cache_key TEXT NOT NULL,
                payload BLOB NOT NULL,
                stored_at TEXT NOT NULL,
                PRIMARY KEY (namespace, cache_key)
            )
            "#,
            [],
        )
        .map_err(|e| OrchestratorError::CacheUnavailable(format!("Failed to create table: {}", e)))?;

        Ok(())
    }

    /// Run `op` against the connection on the blocking pool.
    async fn with_connection<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| OrchestratorError::CacheUnavailable("cache connection poisoned".to_string()))?;
            op(&conn).map_err(|e| OrchestratorError::CacheUnavailable(format!("SQLite error: {}", e)))
        })
        .await
        .map_err(|e| OrchestratorError::CacheUnavailable(format!("cache task failed: {}", e)))?
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn exists(&self, namespace: CacheNamespace, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM cache_entries WHERE namespace = ?1 AND cache_key = ?2)",
                params![namespace.as_str(), key],
                |row| row.get::<_, bool>(0),
            )
        })
        .await
    }

    async fn get(&self, namespace: CacheNamespace, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            conn.query_row(
                "SELECT payload FROM cache_entries WHERE namespace = ?1 AND cache_key = ?2",
                params![namespace.as_str(), key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
        })
        .await
    }

    async fn put(&self, namespace: CacheNamespace, key: &str, value: Vec<u8>) -> Result<()> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            conn.execute(
                r#"
                INSERT OR REPLACE INTO cache_entries (namespace, cache_key, payload, stored_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![namespace.as_str(), key, value, Utc::now().to_rfc3339()],
            )
            .map(|_| ())
        })
        .await
    }

    async fn clear(&self, namespace: CacheNamespace) -> Result<()> {
        let removed = self
            .with_connection(move |conn| {
                conn.execute(
                    "DELETE FROM cache_entries WHERE namespace = ?1",
                    params![namespace.as_str()],
                )
            })
            .await?;
        info!("Cleared {} entries from cache namespace {}", removed, namespace);
        Ok(())
    }
}
