//! Key/value cache service.
//!
//! The gateway only ever reads from the cache. Writes (`put`, `delete`)
//! exist for the job that pre-computes listings and for tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;

use pulse_core::error::PulseError;

use crate::db::Database;

/// Read side of the cache service.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the value stored under `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>, PulseError>;
}

// =============================================================================
// SqliteCache
// =============================================================================

/// Cache backed by the `cache_entries` table.
///
/// Reads run on the blocking pool so a slow disk never stalls the runtime.
#[derive(Debug, Clone)]
pub struct SqliteCache {
    db: Arc<Database>,
}

impl SqliteCache {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace the value under `key`.
    pub fn put(&self, key: &str, value: &str) -> Result<(), PulseError> {
        let now = Utc::now().timestamp();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO cache_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                rusqlite::params![key, value, now],
            )
            .map_err(|e| PulseError::Storage(format!("Failed to write cache entry: {}", e)))?;
            Ok(())
        })
    }

    /// Remove the value under `key`. Returns whether an entry existed.
    pub fn delete(&self, key: &str) -> Result<bool, PulseError> {
        self.db.with_conn(|conn| {
            let removed = conn
                .execute("DELETE FROM cache_entries WHERE key = ?1", [key])
                .map_err(|e| PulseError::Storage(format!("Failed to delete cache entry: {}", e)))?;
            Ok(removed > 0)
        })
    }

    fn get_blocking(&self, key: &str) -> Result<Option<String>, PulseError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM cache_entries WHERE key = ?1",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| PulseError::Storage(format!("Failed to read cache entry: {}", e)))
        })
    }
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<String>, PulseError> {
        let cache = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || cache.get_blocking(&key))
            .await
            .map_err(|e| PulseError::Storage(format!("Cache read task failed: {}", e)))?
    }
}

// =============================================================================
// MemoryCache
// =============================================================================

/// In-process cache, used in tests and when no data directory is available.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), value.into());
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, PulseError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| PulseError::Storage(format!("Cache lock poisoned: {}", e)))?;
        Ok(entries.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_cache() -> SqliteCache {
        SqliteCache::new(Arc::new(Database::in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_sqlite_get_missing_key() {
        let cache = sqlite_cache();
        assert_eq!(cache.get("partners:listing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_put_then_get() {
        let cache = sqlite_cache();
        cache.put("products:listing", r#"[{"name":"Cabo"}]"#).unwrap();
        let value = cache.get("products:listing").await.unwrap();
        assert_eq!(value.as_deref(), Some(r#"[{"name":"Cabo"}]"#));
    }

    #[tokio::test]
    async fn test_sqlite_put_overwrites() {
        let cache = sqlite_cache();
        cache.put("k", "old").unwrap();
        cache.put("k", "new").unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_sqlite_delete() {
        let cache = sqlite_cache();
        cache.put("k", "v").unwrap();
        assert!(cache.delete("k").unwrap());
        assert!(!cache.delete("k").unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_cache_persists_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let cache = SqliteCache::new(Arc::new(Database::new(&path).unwrap()));
            cache.put("partners:listing", "[]").unwrap();
        }
        let cache = SqliteCache::new(Arc::new(Database::new(&path).unwrap()));
        assert_eq!(
            cache.get("partners:listing").await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn test_memory_cache() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("a").await.unwrap(), None);
        cache.put("a", "1");
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_cache_store_as_trait_object() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        assert!(cache.get("missing").await.unwrap().is_none());
    }
}
