
use super::models::{CacheEntry, CacheStats};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

pub struct CacheEntryQueries;

impl CacheEntryQueries {
    /// Fetch an entry that has not expired at `now`
    #[inline]
    pub async fn get_live(
        pool: &SqlitePool,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>> {
        let entry = sqlx::query_as::<_, CacheEntry>(
            "SELECT key, value, expires_at FROM cache_entries WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(now.timestamp())
        .fetch_optional(pool)
        .await
        .context("Failed to get cache entry")?;

        Ok(entry)
    }

    /// Insert or fully overwrite an entry
    #[inline]
    pub async fn upsert(
        pool: &SqlitePool,
        key: &str,
        value: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at.timestamp())
        .execute(pool)
        .await
        .context("Failed to store cache entry")?;

        Ok(())
    }

    #[inline]
    pub async fn delete_expired(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?")
            .bind(now.timestamp())
            .execute(pool)
            .await
            .context("Failed to delete expired cache entries")?
            .rows_affected();

        debug!("Deleted {} expired cache entries", deleted);
        Ok(deleted)
    }

    #[inline]
    pub async fn stats(pool: &SqlitePool, now: DateTime<Utc>) -> Result<CacheStats> {
        let (live_entries, expired_entries): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(CASE WHEN expires_at > ? THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN expires_at <= ? THEN 1 ELSE 0 END), 0)
            FROM cache_entries
            "#,
        )
        .bind(now.timestamp())
        .bind(now.timestamp())
        .fetch_one(pool)
        .await
        .context("Failed to compute cache statistics")?;

        Ok(CacheStats {
            live_entries,
            expired_entries,
        })
    }
}
