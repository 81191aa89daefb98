use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::RetrievalError;
use crate::database::sqlite::models::CacheStats;
use crate::database::sqlite::queries::CacheEntryQueries;
use crate::embeddings::CacheStore;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// SQLite database backing the embedding cache
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .context("Failed to create cache database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running cache database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Cache database migrations completed successfully");
        Ok(())
    }

    /// Open `path`, creating the parent directory first
    pub async fn initialize_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        Self::new(path).await
    }

    /// Remove expired entries, returning how many were deleted
    pub async fn purge_expired(&self) -> Result<u64> {
        CacheEntryQueries::delete_expired(&self.pool, Utc::now()).await
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        CacheEntryQueries::stats(&self.pool, Utc::now()).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CacheStore for Database {
    async fn get(&self, key: &str) -> crate::Result<Option<Vec<u8>>> {
        let entry = CacheEntryQueries::get_live(&self.pool, key, Utc::now())
            .await
            .map_err(|e| RetrievalError::CacheUnavailable(format!("{:#}", e)))?;

        Ok(entry.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> crate::Result<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| RetrievalError::CacheUnavailable(format!("Invalid TTL: {}", e)))?;

        let expires_at = Utc::now().checked_add_signed(ttl).ok_or_else(|| {
            RetrievalError::CacheUnavailable(format!("TTL out of range: {}", ttl))
        })?;

        CacheEntryQueries::upsert(&self.pool, key, value, expires_at)
            .await
            .map_err(|e| RetrievalError::CacheUnavailable(format!("{:#}", e)))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
