// Embeddings module
// Provider client, embedding cache and the cache-checked resolver

pub mod cache;
pub mod openai;
pub mod resolver;

use async_trait::async_trait;

use crate::Result;

pub use cache::{CacheLookup, CacheStore, EmbeddingCache};
pub use openai::OpenAiClient;
pub use resolver::EmbeddingResolver;

/// Turns text into a fixed-dimension embedding vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, used to namespace cache entries
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
