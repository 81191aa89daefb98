#[cfg(test)]
mod tests;

use std::sync::Arc;
use tracing::{debug, warn};

use crate::embeddings::{CacheLookup, EmbeddingCache, EmbeddingProvider};
use crate::{Result, RetrievalError};

/// Resolves text to embeddings, consulting the cache before the provider
#[derive(Clone)]
pub struct EmbeddingResolver {
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    dimension: usize,
}

impl EmbeddingResolver {
    #[inline]
    pub fn new(provider: Arc<dyn EmbeddingProvider>, cache: EmbeddingCache, dimension: usize) -> Self {
        Self {
            provider,
            cache,
            dimension,
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Return the embedding for `text`.
    ///
    /// Cache failures are logged and treated as misses. Provider errors and
    /// malformed embeddings propagate and are never written to the cache.
    #[inline]
    pub async fn resolve(&self, text: &str) -> Result<Vec<f32>> {
        match self.cache.lookup(text).await {
            CacheLookup::Hit(vector) if vector.len() == self.dimension => return Ok(vector),
            CacheLookup::Hit(vector) => {
                warn!(
                    "Ignoring cached embedding with {} dimensions (expected {})",
                    vector.len(),
                    self.dimension
                );
            }
            CacheLookup::Miss => {}
            CacheLookup::Unavailable(reason) => {
                warn!("Embedding cache unavailable, recomputing: {}", reason);
            }
        }

        let vector = self.provider.embed(text).await?;
        self.validate(&vector)?;

        if let Err(e) = self.cache.set(text, &vector).await {
            warn!("Failed to cache embedding: {}", e);
        }

        debug!("Resolved embedding via provider {}", self.provider.model());
        Ok(vector)
    }

    #[inline]
    pub async fn close(&self) {
        self.cache.close().await;
    }

    fn validate(&self, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(RetrievalError::InvalidEmbeddingFormat(
                "provider returned an empty embedding".to_string(),
            ));
        }

        if vector.len() != self.dimension {
            return Err(RetrievalError::InvalidEmbeddingFormat(format!(
                "expected {} dimensions, provider returned {}",
                self.dimension,
                vector.len()
            )));
        }

        if let Some(position) = vector.iter().position(|v| !v.is_finite()) {
            return Err(RetrievalError::InvalidEmbeddingFormat(format!(
                "non-finite value at position {}",
                position
            )));
        }

        Ok(())
    }
}
