// Retrieval module
// Bulk reindexing of the content store and query-time search with hydration


use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::lancedb::{SearchHit, VectorIndexManager};
use crate::database::sqlite::Database;
use crate::database::{ContentRecord, ContentRepository, SqlContentStore};
use crate::embeddings::{EmbeddingCache, EmbeddingResolver, OpenAiClient};
use crate::{Result, RetrievalError};

/// Per-run switches for [`Retriever::reindex_all_with`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexOptions {
    /// Record per-record failures and keep going instead of aborting
    pub continue_on_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub id: i64,
    pub message: String,
}

/// Outcome of a reindex run.
///
/// `error` is set when the run aborted, or when indexing finished but the
/// vector index could not be built.
#[derive(Debug, Default)]
pub struct ReindexReport {
    pub processed: usize,
    pub total: usize,
    pub failed: Vec<RecordFailure>,
    pub error: Option<RetrievalError>,
}

impl ReindexReport {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.failed.is_empty() && self.processed == self.total
    }
}

/// A hydrated search match; `similarity` is the L2 distance (lower is closer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: i64,
    pub text: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Results(Vec<SearchResult>),
    /// The collection has not been created yet
    NotIndexed,
}

impl SearchOutcome {
    #[inline]
    pub fn into_results(self) -> Vec<SearchResult> {
        match self {
            Self::Results(results) => results,
            Self::NotIndexed => Vec::new(),
        }
    }
}

/// Composes the resolver, the vector index and the content repository
pub struct Retriever {
    resolver: EmbeddingResolver,
    vectors: VectorIndexManager,
    content: Arc<dyn ContentRepository>,
    default_limit: usize,
    timeout: Duration,
}

impl Retriever {
    #[inline]
    pub fn new(
        resolver: EmbeddingResolver,
        vectors: VectorIndexManager,
        content: Arc<dyn ContentRepository>,
    ) -> Self {
        Self {
            resolver,
            vectors,
            content,
            default_limit: 5,
            timeout: Duration::from_secs(30),
        }
    }

    #[inline]
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    /// Bound on each content repository call
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connect every backing store described by `config`
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let content = SqlContentStore::connect(config).await?;

        let cache_path = config.cache_path();
        let cache_db = Database::initialize_at(&cache_path).await.map_err(|e| {
            RetrievalError::CacheUnavailable(format!(
                "Failed to open cache at {}: {:#}",
                cache_path.display(),
                e
            ))
        })?;
        let cache = EmbeddingCache::new(
            Arc::new(cache_db),
            config.embedding.model.clone(),
            config.cache_ttl(),
        );

        let provider = OpenAiClient::new(config)?;
        let resolver = EmbeddingResolver::new(
            Arc::new(provider),
            cache,
            config.embedding.dimension as usize,
        );

        let vectors = VectorIndexManager::from_config(config);

        info!(
            "Retriever ready (model {}, collection {}/{})",
            config.embedding.model,
            vectors.database(),
            vectors.collection()
        );

        Ok(Self::new(resolver, vectors, Arc::new(content))
            .with_default_limit(config.search.default_limit)
            .with_timeout(config.request_timeout()))
    }

    #[inline]
    pub fn vectors(&self) -> &VectorIndexManager {
        &self.vectors
    }

    #[inline]
    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Embed and index every content record, aborting on the first failure
    #[inline]
    pub async fn reindex_all(&self) -> ReindexReport {
        self.reindex_all_with(ReindexOptions::default()).await
    }

    #[inline]
    pub async fn reindex_all_with(&self, options: ReindexOptions) -> ReindexReport {
        let mut report = ReindexReport::default();

        if let Err(e) = self.vectors.ensure_collection().await {
            error!("Vector collection setup failed: {}", e);
            report.error = Some(e);
            return report;
        }

        let records = match self.bounded_repository(self.content.fetch_all()).await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to load content records: {}", e);
                report.error = Some(e);
                return report;
            }
        };
        report.total = records.len();
        info!("Reindexing {} content records", report.total);

        for record in &records {
            match self.index_record(record).await {
                Ok(()) => {
                    report.processed += 1;
                    debug!(
                        "Indexed record {} ({}/{})",
                        record.id, report.processed, report.total
                    );
                }
                Err(e) if options.continue_on_error => {
                    warn!("Skipping record {}: {}", record.id, e);
                    report.failed.push(RecordFailure {
                        id: record.id,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    error!(
                        "Reindex aborted at record {} after {}/{}: {}",
                        record.id, report.processed, report.total, e
                    );
                    report.error = Some(e);
                    return report;
                }
            }
        }

        if report.processed == report.total {
            match self.vectors.build_index().await {
                Ok(true) => info!("Vector index built"),
                Ok(false) => debug!("Vector index unchanged"),
                Err(e) => {
                    warn!("Failed to build vector index: {}", e);
                    report.error = Some(e);
                }
            }
        }

        info!(
            "Reindex finished: {}/{} processed, {} failed",
            report.processed,
            report.total,
            report.failed.len()
        );
        report
    }

    async fn index_record(&self, record: &ContentRecord) -> Result<()> {
        let vector = self.resolver.resolve(&record.text).await?;
        self.vectors.insert(record.id, &vector).await
    }

    /// Search with the configured default limit
    #[inline]
    pub async fn search_default(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.search(query, self.default_limit).await
    }

    /// Top `k` records for `query`; empty when nothing has been indexed
    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.search_detailed(query, k)
            .await
            .map(SearchOutcome::into_results)
    }

    #[inline]
    pub async fn search_detailed(&self, query: &str, k: usize) -> Result<SearchOutcome> {
        if k == 0 {
            return Ok(SearchOutcome::Results(Vec::new()));
        }

        let vector = self.resolver.resolve(query).await?;

        let hits = match self.vectors.search(&vector, k).await {
            Ok(hits) => hits,
            Err(RetrievalError::CollectionNotInitialized(reason)) => {
                warn!("Search before indexing: {}", reason);
                return Ok(SearchOutcome::NotIndexed);
            }
            Err(e) => return Err(e),
        };

        let results = self.hydrate(hits).await?;
        debug!("Search returned {} results", results.len());
        Ok(SearchOutcome::Results(results))
    }

    /// Fetch the records behind `hits` concurrently, keeping rank order
    async fn hydrate(&self, hits: Vec<SearchHit>) -> Result<Vec<SearchResult>> {
        let fetches = hits.iter().map(|hit| async move {
            let record = self
                .bounded_repository(self.content.fetch_by_id(hit.id))
                .await?;
            Ok::<_, RetrievalError>((hit, record))
        });

        let fetched = try_join_all(fetches).await?;

        Ok(fetched
            .into_iter()
            .filter_map(|(hit, record)| match record {
                Some(record) => Some(SearchResult {
                    id: record.id,
                    text: record.text,
                    similarity: hit.distance,
                }),
                None => {
                    warn!("Indexed record {} no longer exists, skipping", hit.id);
                    None
                }
            })
            .collect())
    }

    async fn bounded_repository<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, future)
            .await
            .unwrap_or_else(|_| {
                Err(RetrievalError::Repository(format!(
                    "content query timed out after {:?}",
                    self.timeout
                )))
            })
    }

    /// Release the cache and content connections
    #[inline]
    pub async fn close(&self) {
        self.resolver.close().await;
        self.content.close().await;
        debug!("Retriever closed");
    }
}
