//! SQLite realizations of the storage gateway and usage counters.
//!
//! Values are stored as JSON text. Key-value rows carry an absolute
//! `expires_at_ms` and are filtered (and lazily deleted) on read. Blob rows
//! are append-only; a read picks the newest row whose `blob_key` equals the
//! requested key.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::cache::now_ms;
use crate::engine::error::StorageResult;
use crate::engine::keys::usage_key;
use crate::engine::types::ProviderName;
use crate::store::{blob_object_name, StorageGateway};
use crate::usage::ProviderUsageAdapter;

/// Persistent two-tier store.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn ttl_ms(ttl_seconds: u64) -> i64 {
    i64::try_from(ttl_seconds).unwrap_or(i64::MAX).saturating_mul(1000)
}

#[async_trait]
impl StorageGateway for SqliteStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let row = sqlx::query("SELECT value, expires_at_ms FROM kv_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at_ms: i64 = row.try_get("expires_at_ms")?;
        if now_ms() >= expires_at_ms {
            sqlx::query("DELETE FROM kv_entries WHERE key = ? AND expires_at_ms = ?")
                .bind(key)
                .bind(expires_at_ms)
                .execute(&self.pool)
                .await?;
            return Ok(None);
        }

        let raw: String = row.try_get("value")?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn set(&self, key: &str, value: &Value, ttl_seconds: u64) -> StorageResult<()> {
        let expires_at_ms = now_ms().saturating_add(ttl_ms(ttl_seconds));
        let raw = serde_json::to_string(value)?;

        sqlx::query(
            "INSERT INTO kv_entries (key, value, expires_at_ms) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at_ms = excluded.expires_at_ms",
        )
        .bind(key)
        .bind(&raw)
        .bind(expires_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_blob(&self, key: &str) -> StorageResult<Option<Value>> {
        let row = sqlx::query(
            "SELECT value FROM blob_objects
             WHERE blob_key = ?
             ORDER BY written_at_ms DESC, id DESC
             LIMIT 1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("value")?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn put_blob(&self, key: &str, value: &Value, ttl_seconds: u64) -> StorageResult<()> {
        let written_at_ms = now_ms();
        let raw = serde_json::to_string(value)?;
        let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);

        let mut tx = self.pool.begin().await?;
        let next_id: i64 = sqlx::query("SELECT COALESCE(MAX(id), 0) + 1 AS next_id FROM blob_objects")
            .fetch_one(&mut *tx)
            .await?
            .try_get("next_id")?;

        sqlx::query(
            "INSERT INTO blob_objects (blob_key, object_name, value, ttl_seconds, written_at_ms)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(key)
        .bind(blob_object_name(key, written_at_ms, next_id.max(0) as u64))
        .bind(&raw)
        .bind(ttl)
        .bind(written_at_ms)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

/// Persistent usage counters in the `usage:provider:` namespace.
#[derive(Clone)]
pub struct SqliteUsageAdapter {
    pool: SqlitePool,
}

impl SqliteUsageAdapter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderUsageAdapter for SqliteUsageAdapter {
    async fn get_usage(&self, provider: &ProviderName) -> StorageResult<u64> {
        let row = sqlx::query("SELECT count FROM provider_usage WHERE key = ?")
            .bind(usage_key(provider))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let count: i64 = row.try_get("count")?;
                Ok(count.max(0) as u64)
            }
            None => Ok(0),
        }
    }

    async fn increment_usage(&self, provider: &ProviderName) -> StorageResult<()> {
        // Single statement, so the increment is atomic in SQLite.
        sqlx::query(
            "INSERT INTO provider_usage (key, count) VALUES (?, 1)
             ON CONFLICT(key) DO UPDATE SET count = count + 1",
        )
        .bind(usage_key(provider))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reset_usage(&self, provider: &ProviderName) -> StorageResult<()> {
        sqlx::query("DELETE FROM provider_usage WHERE key = ?")
            .bind(usage_key(provider))
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
