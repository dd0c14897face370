//! Context cache backends.
//!
//! [`ContextCache`] maps `"{templateId}-{url}"` keys to assembled context
//! strings with a per-entry time-to-live. Backends:
//! - [`Storage`]: embedded libSQL database (default, survives restarts)
//! - [`UpstashRedisCache`]: Upstash Redis over REST
//! - [`MemoryCache`]: process-local map

mod memory;
mod migrations;
mod redis;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};

use webextract_shared::{Result, WebExtractError};

pub use memory::MemoryCache;
pub use redis::UpstashRedisCache;

/// Key-value store for assembled context with expiry.
#[async_trait]
pub trait ContextCache: Send + Sync {
    /// The live value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value, for `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}

/// libSQL-backed cache handle.
pub struct Storage {
    // Owns the file handle `conn` was opened from.
    _db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create the cache database at `path` and bring its schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| WebExtractError::io(dir, e))?;
        }

        let db = libsql::Builder::new_local(path).build().await.map_err(|e| {
            WebExtractError::Storage(format!("cannot open cache at {}: {e}", path.display()))
        })?;
        let conn = db
            .connect()
            .map_err(|e| WebExtractError::Storage(format!("cannot connect to cache: {e}")))?;

        let applied = schema_version(&conn).await;
        for migration in migrations::all_migrations()
            .into_iter()
            .filter(|m| m.version > applied)
        {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "migrating cache schema"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                WebExtractError::Storage(format!(
                    "cache schema v{} ({}) failed: {e}",
                    migration.version, migration.description
                ))
            })?;
        }

        Ok(Self { _db: db, conn })
    }

    // -----------------------------------------------------------------------
    // Context cache operations
    // -----------------------------------------------------------------------

    /// Get a cached context that has not expired.
    pub async fn get_context(&self, key: &str) -> Result<Option<String>> {
        let now = Utc::now().timestamp_millis();
        let mut rows = self
            .conn
            .query(
                "SELECT context FROM context_cache WHERE cache_key = ?1 AND expires_at > ?2",
                params![key, now],
            )
            .await
            .map_err(|e| WebExtractError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let context: String = row
                    .get(0)
                    .map_err(|e| WebExtractError::Storage(e.to_string()))?;
                Ok(Some(context))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(WebExtractError::Storage(e.to_string())),
        }
    }

    /// Store a context (upserts) that expires after `ttl`.
    pub async fn put_context(&self, key: &str, context: &str, ttl: Duration) -> Result<()> {
        let now = Utc::now();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now.timestamp_millis().saturating_add(ttl_ms);
        self.conn
            .execute(
                "INSERT INTO context_cache (cache_key, context, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(cache_key) DO UPDATE SET
                   context = excluded.context,
                   expires_at = excluded.expires_at,
                   created_at = excluded.created_at",
                params![key, context, expires_at, now.to_rfc3339()],
            )
            .await
            .map_err(|e| WebExtractError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete expired entries. Returns the number of rows removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now().timestamp_millis();
        self.conn
            .execute(
                "DELETE FROM context_cache WHERE expires_at <= ?1",
                params![now],
            )
            .await
            .map_err(|e| WebExtractError::Storage(e.to_string()))
    }
}

#[async_trait]
impl ContextCache for Storage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_context(key)
            .await
            .map_err(|e| WebExtractError::Cache(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.put_context(key, value, ttl)
            .await
            .map_err(|e| WebExtractError::Cache(e.to_string()))
    }
}

/// Highest applied migration; 0 for a fresh file without `schema_migrations`.
async fn schema_version(conn: &Connection) -> u32 {
    let Ok(mut rows) = conn
        .query("SELECT MAX(version) FROM schema_migrations", params![])
        .await
    else {
        return 0;
    };
    match rows.next().await {
        Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("wx_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_creates_schema() {
        let storage = test_storage().await;
        assert_eq!(schema_version(&storage.conn).await, 1);
    }

    #[tokio::test]
    async fn reopening_keeps_schema_version() {
        let tmp = std::env::temp_dir().join(format!("wx_test_{}.db", Uuid::now_v7()));
        drop(Storage::open(&tmp).await.expect("first open"));
        let reopened = Storage::open(&tmp).await.expect("second open");
        assert_eq!(schema_version(&reopened.conn).await, 1);
    }

    #[tokio::test]
    async fn unopenable_path_reports_cache_error() {
        let dir = std::env::temp_dir().join(format!("wx_dir_{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("create dir");

        let err = match Storage::open(&dir).await {
            Ok(_) => panic!("a directory is not a database"),
            Err(e) => e,
        };
        assert!(matches!(err, WebExtractError::Storage(_)), "got {err:?}");
        assert!(err.to_string().contains("cache"), "got {err}");
    }

    #[tokio::test]
    async fn set_then_get_within_ttl() {
        let storage = test_storage().await;
        let key = "tpl-1-https://example.com";

        assert!(storage.get(key).await.expect("get").is_none());
        storage
            .set(key, "cached context", Duration::from_secs(3600))
            .await
            .expect("set");
        assert_eq!(
            storage.get(key).await.expect("get").as_deref(),
            Some("cached context")
        );
    }

    #[tokio::test]
    async fn set_overwrites() {
        let storage = test_storage().await;
        storage.set("k", "old", Duration::from_secs(60)).await.expect("set");
        storage.set("k", "new", Duration::from_secs(60)).await.expect("set");
        assert_eq!(storage.get("k").await.expect("get").as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn expired_entries_are_absent_and_purged() {
        let storage = test_storage().await;
        storage.set("gone", "v", Duration::ZERO).await.expect("set");
        storage.set("live", "v", Duration::from_secs(60)).await.expect("set");

        assert!(storage.get("gone").await.expect("get").is_none());
        assert_eq!(storage.purge_expired().await.expect("purge"), 1);
        assert!(storage.get("live").await.expect("get").is_some());
    }
}
