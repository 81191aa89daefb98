
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Row of the `cache_entries` table
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<u8>,
    /// Unix timestamp (seconds) after which the entry is absent
    pub expires_at: i64,
}

impl CacheEntry {
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now.timestamp()
    }
}

/// Aggregate counts over the cache table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub live_entries: i64,
    pub expired_entries: i64,
}
