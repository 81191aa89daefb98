
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{Result, RetrievalError};

const KEY_PREFIX: &str = "vector:";

/// Key/value store with per-entry expiry
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Overwrites any existing value for `key`
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Release the backing connection
    async fn close(&self) {}
}

/// Outcome of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(Vec<f32>),
    Miss,
    /// The store could not be reached; callers treat this as a miss
    Unavailable(String),
}

impl CacheLookup {
    #[inline]
    pub fn into_vector(self) -> Option<Vec<f32>> {
        match self {
            Self::Hit(vector) => Some(vector),
            Self::Miss | Self::Unavailable(_) => None,
        }
    }
}

/// Advisory cache of text embeddings keyed by model and text hash
#[derive(Clone)]
pub struct EmbeddingCache {
    store: Arc<dyn CacheStore>,
    namespace: String,
    ttl: Duration,
    timeout: Duration,
}

impl EmbeddingCache {
    #[inline]
    pub fn new(store: Arc<dyn CacheStore>, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            ttl,
            timeout: Duration::from_secs(5),
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cache key for `text`; identical text always maps to the same key
    #[inline]
    pub fn key_for(&self, text: &str) -> String {
        format!(
            "{}{}:{}",
            KEY_PREFIX,
            self.namespace,
            blake3::hash(text.as_bytes()).to_hex()
        )
    }

    #[inline]
    pub async fn lookup(&self, text: &str) -> CacheLookup {
        let key = self.key_for(text);

        let bytes = match tokio::time::timeout(self.timeout, self.store.get(&key)).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => {
                debug!("Embedding cache miss for {}", key);
                return CacheLookup::Miss;
            }
            Ok(Err(e)) => return CacheLookup::Unavailable(e.to_string()),
            Err(_) => {
                return CacheLookup::Unavailable(format!(
                    "lookup timed out after {:?}",
                    self.timeout
                ));
            }
        };

        match serde_json::from_slice::<Vec<f32>>(&bytes) {
            Ok(vector) => {
                debug!("Embedding cache hit for {}", key);
                CacheLookup::Hit(vector)
            }
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                CacheLookup::Miss
            }
        }
    }

    #[inline]
    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.lookup(text).await.into_vector()
    }

    #[inline]
    pub async fn close(&self) {
        self.store.close().await;
    }

    #[inline]
    pub async fn set(&self, text: &str, vector: &[f32]) -> Result<()> {
        let key = self.key_for(text);
        let bytes = serde_json::to_vec(vector)
            .map_err(|e| RetrievalError::CacheUnavailable(format!("encode failed: {}", e)))?;

        match tokio::time::timeout(self.timeout, self.store.set(&key, &bytes, self.ttl)).await {
            Ok(result) => result,
            Err(_) => Err(RetrievalError::CacheUnavailable(format!(
                "store timed out after {:?}",
                self.timeout
            ))),
        }
    }
}
