
use anyhow::Context;
use async_trait::async_trait;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{Config, ContentConfig};
use crate::database::{ContentRecord, ContentRepository};
use crate::{Result, RetrievalError};

/// Content repository over any sqlx-supported database (SQLite or MySQL)
#[derive(Debug, Clone)]
pub struct SqlContentStore {
    pool: AnyPool,
    select_all: String,
    select_by_id: String,
}

impl SqlContentStore {
    #[inline]
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::connect_url(
            &config.content_database_url(),
            &config.content,
            config.request_timeout(),
        )
        .await
    }

    /// Connect to `database_url`; table and column names must already be
    /// validated identifiers
    #[inline]
    pub async fn connect_url(
        database_url: &str,
        content: &ContentConfig,
        timeout: Duration,
    ) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(content.max_connections)
            .acquire_timeout(timeout)
            .connect(database_url)
            .await
            .context("Failed to create content database connection pool")
            .map_err(|e| RetrievalError::Repository(format!("{:#}", e)))?;

        info!("Connected to content database");
        Ok(Self::with_pool(pool, content))
    }

    #[inline]
    pub fn with_pool(pool: AnyPool, content: &ContentConfig) -> Self {
        let select_all = format!(
            "SELECT {id} AS id, {text} AS text FROM {table}",
            id = content.id_column,
            text = content.text_column,
            table = content.table
        );
        let select_by_id = format!("{} WHERE {} = ?", select_all, content.id_column);

        Self {
            pool,
            select_all,
            select_by_id,
        }
    }
}

#[async_trait]
impl ContentRepository for SqlContentStore {
    async fn fetch_all(&self) -> Result<Vec<ContentRecord>> {
        let records = sqlx::query_as::<_, ContentRecord>(&self.select_all)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                RetrievalError::Repository(format!("Failed to fetch content records: {}", e))
            })?;

        debug!("Fetched {} content records", records.len());
        Ok(records)
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<ContentRecord>> {
        sqlx::query_as::<_, ContentRecord>(&self.select_by_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                RetrievalError::Repository(format!("Failed to fetch content {}: {}", id, e))
            })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
