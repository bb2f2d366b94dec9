//! Distributed cache tier.
//!
//! The tier is shared across processes and strictly best-effort: every caller
//! treats a `StoreError` as a miss or a skipped write.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::types::now_ms;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("payload codec error: {0}")]
    Codec(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// A live value read from the store, with the expiry its writer gave it.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredValue {
    pub bytes: Vec<u8>,
    /// Milliseconds since the epoch
    pub expires_at: u64,
}

impl StoredValue {
    pub fn remaining_ttl(&self, now: u64) -> Duration {
        Duration::from_millis(self.expires_at.saturating_sub(now))
    }
}

/// Byte-level key/value store with per-key expiry.
#[async_trait]
pub trait DistributedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Returns whether a live key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove every key starting with `prefix`; returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

// ================================================================================================
// SQLITE STORE
// ================================================================================================

/// SQLite-backed store. Every process opening the same file shares entries.
///
/// Blocking SQLite calls run on the tokio blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("Failed to create store directory: {}", e))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Private in-memory store, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cache_entries_expires ON cache_entries(expires_at)",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            op(&guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("store task failed: {}", e)))?
    }

    /// Delete expired rows; returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        self.run(|conn| {
            let removed = conn.execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![now_ms() as i64],
            )?;
            Ok(removed as u64)
        })
        .await
    }
}

#[async_trait]
impl DistributedStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        let key = key.to_string();
        self.run(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value, expires_at FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                    params![key, now_ms() as i64],
                    |row| {
                        Ok(StoredValue {
                            bytes: row.get(0)?,
                            expires_at: row.get::<_, i64>(1)?.max(0) as u64,
                        })
                    },
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let key = key.to_string();
        let expires_at = now_ms().saturating_add(ttl.as_millis() as u64);
        self.run(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, value, expires_at as i64],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM cache_entries WHERE key = ?1",
                params![key],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let prefix = prefix.to_string();
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM cache_entries WHERE substr(key, 1, length(?1)) = ?1",
                params![prefix],
            )?;
            Ok(removed as u64)
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .set("acmg:cache:tool:abc", b"payload".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let before = now_ms();
        let value = store.get("acmg:cache:tool:abc").await.unwrap().unwrap();
        assert_eq!(value.bytes, b"payload");
        assert!(value.remaining_ttl(before) <= Duration::from_secs(60));
        assert!(value.remaining_ttl(before) > Duration::from_secs(50));

        assert!(store.delete("acmg:cache:tool:abc").await.unwrap());
        assert!(store.get("acmg:cache:tool:abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_rows_invisible() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("k", b"v".to_vec(), Duration::ZERO).await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_prefix_only_touches_namespace() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ttl = Duration::from_secs(60);
        store.set("acmg:cache:tool:a", vec![1], ttl).await.unwrap();
        store.set("acmg:cache:tool:b", vec![2], ttl).await.unwrap();
        store.set("acmg:cache:resource:a", vec![3], ttl).await.unwrap();

        let removed = store.delete_prefix("acmg:cache:tool:").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("acmg:cache:resource:a").await.unwrap().is_some());
        assert!(store.ping().await.is_ok());
    }
}
