// In-memory collaborators shared by the unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::database::{ContentRecord, ContentRepository};
use crate::embeddings::{CacheStore, EmbeddingProvider};
use crate::{Result, RetrievalError};

/// Deterministic pseudo-embedding derived from the text hash
pub(crate) fn stub_vector(text: &str, dimension: usize) -> Vec<f32> {
    let hash = blake3::hash(text.as_bytes());
    let bytes = hash.as_bytes();
    (0..dimension)
        .map(|i| f32::from(bytes[i % bytes.len()]) / 255.0)
        .collect()
}

#[derive(Default)]
pub(crate) struct MemoryCacheStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    sets: AtomicUsize,
}

impl MemoryCacheStore {
    pub(crate) fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub(crate) fn insert_raw(&self, key: &str, value: &[u8]) {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(key.to_string(), value.to_vec());
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .expect("cache lock poisoned")
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &[u8], _ttl: Duration) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.insert_raw(key, value);
        Ok(())
    }
}

/// Cache store whose backend is always down
pub(crate) struct FailingCacheStore;

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(RetrievalError::CacheUnavailable(
            "connection refused".to_string(),
        ))
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
        Err(RetrievalError::CacheUnavailable(
            "connection refused".to_string(),
        ))
    }
}

/// Cache store that answers only after `delay`
pub(crate) struct SlowCacheStore {
    pub(crate) delay: Duration,
}

#[async_trait]
impl CacheStore for SlowCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

pub(crate) struct StubProvider {
    dimension: usize,
    calls: AtomicUsize,
    failing_texts: HashSet<String>,
    fixed_response: Option<Vec<f32>>,
}

impl StubProvider {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            failing_texts: HashSet::new(),
            fixed_response: None,
        }
    }

    pub(crate) fn failing_on(mut self, text: &str) -> Self {
        self.failing_texts.insert(text.to_string());
        self
    }

    /// Always answer with `response`, whatever its length
    pub(crate) fn responding_with(mut self, response: Vec<f32>) -> Self {
        self.fixed_response = Some(response);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    fn model(&self) -> &str {
        "stub-model"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_texts.contains(text) {
            return Err(RetrievalError::EmbeddingProvider(
                "quota exceeded".to_string(),
            ));
        }

        Ok(self
            .fixed_response
            .clone()
            .unwrap_or_else(|| stub_vector(text, self.dimension)))
    }
}

/// Repository over a fixed record list with optional per-id latency
#[derive(Default)]
pub(crate) struct MemoryRepository {
    records: Vec<ContentRecord>,
    delays: HashMap<i64, Duration>,
    fail_fetch_all: bool,
}

impl MemoryRepository {
    pub(crate) fn new(records: &[(i64, &str)]) -> Self {
        Self {
            records: records
                .iter()
                .map(|(id, text)| ContentRecord {
                    id: *id,
                    text: (*text).to_string(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub(crate) fn with_delay(mut self, id: i64, delay: Duration) -> Self {
        self.delays.insert(id, delay);
        self
    }

    pub(crate) fn failing_fetch_all(mut self) -> Self {
        self.fail_fetch_all = true;
        self
    }
}

#[async_trait]
impl ContentRepository for MemoryRepository {
    async fn fetch_all(&self) -> Result<Vec<ContentRecord>> {
        if self.fail_fetch_all {
            return Err(RetrievalError::Repository("table is locked".to_string()));
        }
        Ok(self.records.clone())
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<ContentRecord>> {
        if let Some(delay) = self.delays.get(&id) {
            tokio::time::sleep(*delay).await;
        }
        Ok(self.records.iter().find(|r| r.id == id).cloned())
    }
}
