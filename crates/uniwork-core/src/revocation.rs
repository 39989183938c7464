//! Revocation store
//!
//! Holds the one live refresh token per user under `refresh_token:<user id>`.
//! Only atomic single-key get/set/delete are required; last write wins.
//!
//! Backends:
//! - [`PgRevocationStore`]: PostgreSQL table with an expiry column
//! - [`MokaRevocationStore`]: in-process moka cache with per-entry TTL

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use moka::future::Cache;
use moka::Expiry;
use sqlx::postgres::PgPool;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::{Result, UniworkError};

/// Key under which a user's live refresh token is stored
pub fn refresh_token_key(user_id: Uuid) -> String {
    format!("refresh_token:{user_id}")
}

/// Key-value store with expiry
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Read the value stored under `key`, if present and unexpired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key` for `ttl_secs` seconds, replacing any previous value
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    async fn del(&self, key: &str) -> Result<()>;

    /// Round-trip to the backend
    async fn health_check(&self) -> Result<()>;

    /// Release backend resources
    async fn close(&self) {}

    /// Backend name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// PostgreSQL-backed revocation store
///
/// Shares the credential store's pool. Expired rows are ignored on read and
/// removed by [`PgRevocationStore::purge_expired`].
pub struct PgRevocationStore {
    pool: PgPool,
}

impl PgRevocationStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `revocation_entries` table if it does not exist
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS revocation_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            UniworkError::DatabaseError(format!("Failed to create revocation_entries table: {e}"))
        })?;

        Ok(())
    }

    /// Delete rows whose TTL has elapsed, returning how many were removed
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM revocation_entries WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(|e| UniworkError::DatabaseError(format!("Failed to purge entries: {e}")))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RevocationStore for PgRevocationStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT value FROM revocation_entries WHERE key = $1 AND expires_at > NOW()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| UniworkError::DatabaseError(format!("Failed to read {key}: {e}")))?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let expires_at = Utc::now() + ChronoDuration::seconds(ttl_secs as i64);

        sqlx::query(
            r#"
            INSERT INTO revocation_entries (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| UniworkError::DatabaseError(format!("Failed to write {key}: {e}")))?;

        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM revocation_entries WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| UniworkError::DatabaseError(format!("Failed to delete {key}: {e}")))?;

        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| UniworkError::DatabaseError(format!("Health check failed: {e}")))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// In-process (moka)
// ============================================================================

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Gives each entry the TTL it was written with; overwrites restart the clock
struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process revocation store backed by a moka cache
#[derive(Clone)]
pub struct MokaRevocationStore {
    cache: Cache<String, Entry>,
}

impl MokaRevocationStore {
    /// Create a store holding at most `max_capacity` live tokens
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self { cache }
    }
}

impl Default for MokaRevocationStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl RevocationStore for MokaRevocationStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let entry = Entry {
            value: value.to_string(),
            ttl: Duration::from_secs(ttl_secs),
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
