use super::*;
use crate::embeddings::CacheStore;
use crate::test_support::{FailingCacheStore, MemoryCacheStore, StubProvider, stub_vector};
use std::time::Duration;

const DIMENSION: usize = 8;

fn resolver_with(
    provider: Arc<StubProvider>,
    store: Arc<dyn CacheStore>,
) -> EmbeddingResolver {
    let cache = EmbeddingCache::new(store, provider.model().to_string(), Duration::from_secs(60));
    EmbeddingResolver::new(provider, cache, DIMENSION)
}

#[tokio::test]
async fn second_resolve_is_served_from_cache() {
    let provider = Arc::new(StubProvider::new(DIMENSION));
    let store = Arc::new(MemoryCacheStore::default());
    let resolver = resolver_with(Arc::clone(&provider), Arc::clone(&store) as Arc<dyn CacheStore>);

    let first = resolver.resolve("apple").await.expect("first resolve");
    let second = resolver.resolve("apple").await.expect("second resolve");

    assert_eq!(first, second);
    assert_eq!(first.len(), DIMENSION);
    assert_eq!(provider.calls(), 1);
    assert_eq!(store.set_count(), 1);
}

#[tokio::test]
async fn distinct_texts_each_reach_the_provider() {
    let provider = Arc::new(StubProvider::new(DIMENSION));
    let resolver = resolver_with(
        Arc::clone(&provider),
        Arc::new(MemoryCacheStore::default()),
    );

    let apple = resolver.resolve("apple").await.expect("apple");
    let banana = resolver.resolve("banana").await.expect("banana");

    assert_ne!(apple, banana);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn wrong_dimension_is_rejected_and_not_cached() {
    let provider = Arc::new(StubProvider::new(DIMENSION).responding_with(vec![0.1, 0.2]));
    let store = Arc::new(MemoryCacheStore::default());
    let resolver = resolver_with(Arc::clone(&provider), Arc::clone(&store) as Arc<dyn CacheStore>);

    let result = resolver.resolve("apple").await;
    assert!(matches!(
        result,
        Err(RetrievalError::InvalidEmbeddingFormat(_))
    ));
    assert_eq!(store.len(), 0);

    // Nothing was cached, so the provider is asked again
    let _ = resolver.resolve("apple").await;
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn empty_and_non_finite_embeddings_are_rejected() {
    let empty = resolver_with(
        Arc::new(StubProvider::new(DIMENSION).responding_with(Vec::new())),
        Arc::new(MemoryCacheStore::default()),
    );
    assert!(matches!(
        empty.resolve("x").await,
        Err(RetrievalError::InvalidEmbeddingFormat(_))
    ));

    let mut poisoned = vec![0.0; DIMENSION];
    poisoned[3] = f32::NAN;
    let nan = resolver_with(
        Arc::new(StubProvider::new(DIMENSION).responding_with(poisoned)),
        Arc::new(MemoryCacheStore::default()),
    );
    assert!(matches!(
        nan.resolve("x").await,
        Err(RetrievalError::InvalidEmbeddingFormat(_))
    ));
}

#[tokio::test]
async fn provider_errors_propagate_uncached() {
    let provider = Arc::new(StubProvider::new(DIMENSION).failing_on("apple"));
    let store = Arc::new(MemoryCacheStore::default());
    let resolver = resolver_with(provider, Arc::clone(&store) as Arc<dyn CacheStore>);

    let result = resolver.resolve("apple").await;
    assert!(matches!(result, Err(RetrievalError::EmbeddingProvider(_))));
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn cache_outage_fails_open() {
    let provider = Arc::new(StubProvider::new(DIMENSION));
    let resolver = resolver_with(Arc::clone(&provider), Arc::new(FailingCacheStore));

    let vector = resolver.resolve("x").await.expect("resolve should fail open");

    assert_eq!(vector, stub_vector("x", DIMENSION));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn stale_dimension_in_cache_is_recomputed() {
    let provider = Arc::new(StubProvider::new(DIMENSION));
    let store = Arc::new(MemoryCacheStore::default());
    let resolver = resolver_with(Arc::clone(&provider), Arc::clone(&store) as Arc<dyn CacheStore>);

    let cache = EmbeddingCache::new(
        Arc::clone(&store) as Arc<dyn CacheStore>,
        "stub-model",
        Duration::from_secs(60),
    );
    cache.set("apple", &[1.0, 2.0]).await.expect("seed cache");

    let vector = resolver.resolve("apple").await.expect("resolve");
    assert_eq!(vector.len(), DIMENSION);
    assert_eq!(provider.calls(), 1);
    assert_eq!(cache.get("apple").await, Some(vector));
}
