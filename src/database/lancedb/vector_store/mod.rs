
use super::{IndexParams, IndexedVector, SearchHit};
use crate::config::Config;
use crate::{Result, RetrievalError};
use arrow::array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::index::Index;
use lancedb::index::vector::IvfFlatIndexBuilder;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const ID_COLUMN: &str = "id";
const VECTOR_COLUMN: &str = "vector";
const DISTANCE_COLUMN: &str = "_distance";

/// Manages one collection of `(id, vector)` rows inside a named database.
///
/// A database is a directory under the vector store root. No connection is
/// kept between calls: every operation resolves the configured database and
/// opens its own connection, so the active database can never drift.
#[derive(Debug, Clone)]
pub struct VectorIndexManager {
    root: PathBuf,
    database: String,
    collection: String,
    dimension: usize,
    params: IndexParams,
    timeout: Duration,
}

impl VectorIndexManager {
    #[inline]
    pub fn new(
        root: impl Into<PathBuf>,
        database: impl Into<String>,
        collection: impl Into<String>,
        dimension: usize,
        params: IndexParams,
    ) -> Self {
        Self {
            root: root.into(),
            database: database.into(),
            collection: collection.into(),
            dimension,
            params,
            timeout: Duration::from_secs(30),
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.vector_store_path(),
            config.vector_store.database.clone(),
            config.vector_store.collection.clone(),
            config.embedding.dimension as usize,
            IndexParams::from(&config.vector_store),
        )
        .with_timeout(config.request_timeout())
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn database(&self) -> &str {
        &self.database
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn database_path(&self) -> PathBuf {
        self.root.join(&self.database)
    }

    /// Names of all databases under the store root
    #[inline]
    pub async fn list_databases(&self) -> Result<Vec<String>> {
        if !tokio::fs::try_exists(&self.root).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            RetrievalError::DatabaseInit(format!("Failed to list databases: {}", e))
        })?;

        let mut databases = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            RetrievalError::DatabaseInit(format!("Failed to list databases: {}", e))
        })? {
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            if is_dir {
                if let Some(name) = entry.file_name().to_str() {
                    databases.push(name.to_string());
                }
            }
        }

        databases.sort();
        Ok(databases)
    }

    /// Create the configured database if it is missing and connect to it
    #[inline]
    pub async fn ensure_database(&self) -> Result<Connection> {
        let databases = self.list_databases().await?;

        if !databases.contains(&self.database) {
            info!("Creating vector database {}", self.database);
            tokio::fs::create_dir_all(self.database_path())
                .await
                .map_err(|e| {
                    RetrievalError::DatabaseInit(format!(
                        "Failed to create database {}: {}",
                        self.database, e
                    ))
                })?;
        }

        self.use_database()
            .await?
            .ok_or_else(|| {
                RetrievalError::DatabaseInit(format!(
                    "Database {} disappeared after creation",
                    self.database
                ))
            })
    }

    /// Connect to the configured database, or `None` if it does not exist
    async fn use_database(&self) -> Result<Option<Connection>> {
        let path = self.database_path();
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }

        let uri = path.to_string_lossy().into_owned();
        let connection = self
            .bounded("connect to database", lancedb::connect(&uri).execute())
            .await
            .map_err(RetrievalError::DatabaseInit)?;

        debug!("Using vector database {}", self.database);
        Ok(Some(connection))
    }

    /// Create the collection, its index and load it; safe to call repeatedly
    #[inline]
    pub async fn ensure_collection(&self) -> Result<()> {
        let connection = self.ensure_database().await?;

        let table_names = self
            .bounded("list collections", connection.table_names().execute())
            .await
            .map_err(RetrievalError::CollectionInit)?;

        if table_names.contains(&self.collection) {
            debug!("Collection {} already exists", self.collection);
        } else {
            info!(
                "Creating collection {} with {} dimensions",
                self.collection, self.dimension
            );
            self.bounded(
                "create collection",
                connection
                    .create_empty_table(&self.collection, self.schema())
                    .execute(),
            )
            .await
            .map_err(RetrievalError::CollectionInit)?;
        }

        let table = self
            .bounded(
                "load collection",
                connection.open_table(&self.collection).execute(),
            )
            .await
            .map_err(RetrievalError::CollectionInit)?;

        let stored_dimension = self
            .stored_dimension(&table)
            .await
            .map_err(RetrievalError::CollectionInit)?;
        if stored_dimension != self.dimension {
            error!(
                "Collection {} stores {} dimensions, configured for {}",
                self.collection, stored_dimension, self.dimension
            );
            return Err(RetrievalError::CollectionInit(format!(
                "collection {} stores {}-dimensional vectors but {} were configured",
                self.collection, stored_dimension, self.dimension
            )));
        }

        self.ensure_index(&table)
            .await
            .map_err(RetrievalError::CollectionInit)?;

        info!("Collection {} is ready", self.collection);
        Ok(())
    }

    /// Build the IVF_FLAT index if enough rows exist and none is present.
    /// Returns whether an index was built.
    #[inline]
    pub async fn build_index(&self) -> Result<bool> {
        let table = self
            .open_collection(RetrievalError::CollectionInit)
            .await?
            .ok_or_else(|| self.not_initialized())?;

        self.ensure_index(&table)
            .await
            .map_err(RetrievalError::CollectionInit)
    }

    #[inline]
    pub async fn has_index(&self) -> Result<bool> {
        match self.open_collection(RetrievalError::Search).await? {
            Some(table) => self
                .vector_index_exists(&table)
                .await
                .map_err(RetrievalError::Search),
            None => Ok(false),
        }
    }

    /// Append one vector; an existing row with the same id is kept
    #[inline]
    pub async fn insert(&self, id: i64, vector: &[f32]) -> Result<()> {
        self.insert_batch(&[IndexedVector {
            id,
            vector: vector.to_vec(),
        }])
        .await
    }

    #[inline]
    pub async fn insert_batch(&self, records: &[IndexedVector]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        for record in records {
            self.check_shape(&record.vector)?;
        }

        let table = self
            .open_collection(RetrievalError::Insert)
            .await?
            .ok_or_else(|| self.not_initialized())?;

        let record_batch = self
            .create_record_batch(records)
            .map_err(RetrievalError::Insert)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.bounded("insert vectors", table.add(reader).execute())
            .await
            .map_err(RetrievalError::Insert)?;

        debug!("Inserted {} vectors into {}", records.len(), self.collection);
        Ok(())
    }

    /// k-NN search under L2; hits come back in the engine's rank order
    #[inline]
    pub async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.check_shape(vector)?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let table = self
            .open_collection(RetrievalError::Search)
            .await?
            .ok_or_else(|| self.not_initialized())?;

        // The engine cannot return more rows than the collection holds
        let stored = self
            .bounded("count rows", table.count_rows(None))
            .await
            .map_err(RetrievalError::Search)?;
        let k = k.min(stored);
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = table
            .vector_search(vector)
            .map_err(|e| RetrievalError::Search(format!("Failed to create vector search: {}", e)))?
            .column(VECTOR_COLUMN)
            .distance_type(DistanceType::L2)
            .nprobes(self.params.nprobe as usize)
            .select(Select::columns(&[ID_COLUMN]))
            .limit(k);

        let stream = self
            .bounded("execute search", query.execute())
            .await
            .map_err(RetrievalError::Search)?;

        let batches: Vec<RecordBatch> = self
            .bounded("read search results", stream.try_collect::<Vec<_>>())
            .await
            .map_err(RetrievalError::Search)?;

        let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
        let mut hits = Vec::with_capacity(rows.min(k));
        for batch in &batches {
            hits.extend(Self::parse_search_batch(batch).map_err(RetrievalError::Search)?);
        }
        hits.truncate(k);

        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Number of stored vectors, 0 if the collection does not exist
    #[inline]
    pub async fn count(&self) -> Result<u64> {
        match self.open_collection(RetrievalError::Search).await? {
            Some(table) => {
                let rows = self
                    .bounded("count rows", table.count_rows(None))
                    .await
                    .map_err(RetrievalError::Search)?;
                Ok(rows as u64)
            }
            None => Ok(0),
        }
    }

    /// Drop the collection; returns whether one existed
    #[inline]
    pub async fn drop_collection(&self) -> Result<bool> {
        let Some(connection) = self.use_database().await? else {
            return Ok(false);
        };

        let table_names = self
            .bounded("list collections", connection.table_names().execute())
            .await
            .map_err(RetrievalError::CollectionInit)?;

        if !table_names.contains(&self.collection) {
            return Ok(false);
        }

        warn!("Dropping collection {}", self.collection);
        self.bounded("drop collection", connection.drop_table(&self.collection))
            .await
            .map_err(RetrievalError::CollectionInit)?;

        Ok(true)
    }

    async fn open_collection(
        &self,
        to_error: fn(String) -> RetrievalError,
    ) -> Result<Option<Table>> {
        let Some(connection) = self.use_database().await? else {
            return Ok(None);
        };

        let table_names = self
            .bounded("list collections", connection.table_names().execute())
            .await
            .map_err(to_error)?;

        if !table_names.contains(&self.collection) {
            return Ok(None);
        }

        let table = self
            .bounded(
                "open collection",
                connection.open_table(&self.collection).execute(),
            )
            .await
            .map_err(to_error)?;

        Ok(Some(table))
    }

    async fn ensure_index(&self, table: &Table) -> std::result::Result<bool, String> {
        if self.vector_index_exists(table).await? {
            return Ok(false);
        }

        let rows = self.bounded("count rows", table.count_rows(None)).await?;
        if rows < self.params.nlist as usize {
            debug!(
                "Deferring IVF_FLAT index: {} rows, {} partitions required",
                rows, self.params.nlist
            );
            return Ok(false);
        }

        info!(
            "Building IVF_FLAT index (L2, nlist={}) over {} rows",
            self.params.nlist, rows
        );
        let builder = IvfFlatIndexBuilder::default()
            .distance_type(DistanceType::L2)
            .num_partitions(self.params.nlist);

        self.bounded(
            "build vector index",
            table
                .create_index(&[VECTOR_COLUMN], Index::IvfFlat(builder))
                .execute(),
        )
        .await?;

        Ok(true)
    }

    async fn vector_index_exists(&self, table: &Table) -> std::result::Result<bool, String> {
        let indices = self.bounded("list indices", table.list_indices()).await?;

        Ok(indices
            .iter()
            .any(|index| index.columns.iter().any(|c| c == VECTOR_COLUMN)))
    }

    async fn stored_dimension(&self, table: &Table) -> std::result::Result<usize, String> {
        let schema = self.bounded("read collection schema", table.schema()).await?;

        for field in schema.fields() {
            if field.name() == VECTOR_COLUMN {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err("collection has no fixed-size vector column".to_string())
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new(ID_COLUMN, DataType::Int64, false),
            Field::new(
                VECTOR_COLUMN,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
        ]))
    }

    fn create_record_batch(
        &self,
        records: &[IndexedVector],
    ) -> std::result::Result<RecordBatch, String> {
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();

        let mut flat_values = Vec::with_capacity(records.len() * self.dimension);
        for record in records {
            flat_values.extend_from_slice(&record.vector);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| format!("Failed to create vector array: {}", e))?;

        RecordBatch::try_new(
            self.schema(),
            vec![Arc::new(Int64Array::from(ids)), Arc::new(vector_array)],
        )
        .map_err(|e| format!("Failed to create record batch: {}", e))
    }

    fn parse_search_batch(batch: &RecordBatch) -> std::result::Result<Vec<SearchHit>, String> {
        let ids = batch
            .column_by_name(ID_COLUMN)
            .ok_or_else(|| "Missing id column".to_string())?
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| "Invalid id column type".to_string())?;

        let distances = batch
            .column_by_name(DISTANCE_COLUMN)
            .ok_or_else(|| "Missing distance column".to_string())?
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| "Invalid distance column type".to_string())?;

        Ok((0..batch.num_rows())
            .filter(|&row| !ids.is_null(row) && !distances.is_null(row))
            .map(|row| SearchHit {
                id: ids.value(row),
                distance: distances.value(row),
            })
            .collect())
    }

    fn check_shape(&self, vector: &[f32]) -> Result<()> {
        if vector.len() == self.dimension {
            Ok(())
        } else {
            Err(RetrievalError::InvalidVectorShape {
                expected: self.dimension,
                actual: vector.len(),
            })
        }
    }

    fn not_initialized(&self) -> RetrievalError {
        RetrievalError::CollectionNotInitialized(format!(
            "collection {} in database {} does not exist",
            self.collection, self.database
        ))
    }

    /// Await `future` under the request timeout, flattening engine errors
    /// and timeouts into one message
    async fn bounded<T, E, F>(&self, operation: &str, future: F) -> std::result::Result<T, String>
    where
        E: Display,
        F: Future<Output = std::result::Result<T, E>>,
    {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(format!("Failed to {}: {}", operation, e)),
            Err(_) => Err(format!(
                "Timed out after {:?} trying to {}",
                self.timeout, operation
            )),
        }
    }
}
