// Database module
// Relational content store, SQLite embedding cache and the LanceDB vector index

pub mod content;
pub mod lancedb;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::Result;

pub use content::SqlContentStore;

/// A row of source text; `id` is the join key with the vector index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ContentRecord {
    pub id: i64,
    pub text: String,
}

/// Read-only access to the relational content store
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<ContentRecord>>;

    async fn fetch_by_id(&self, id: i64) -> Result<Option<ContentRecord>>;

    async fn close(&self) {}
}
