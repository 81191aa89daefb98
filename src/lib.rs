use thiserror::Error;

pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("Invalid embedding format: {0}")]
    InvalidEmbeddingFormat(String),

    #[error("Vector database initialization failed: {0}")]
    DatabaseInit(String),

    #[error("Vector collection initialization failed: {0}")]
    CollectionInit(String),

    #[error("Vector collection not initialized: {0}")]
    CollectionNotInitialized(String),

    #[error("Invalid vector shape: expected {expected} dimensions, got {actual}")]
    InvalidVectorShape { expected: usize, actual: usize },

    #[error("Vector insert failed: {0}")]
    Insert(String),

    #[error("Vector search failed: {0}")]
    Search(String),

    #[error("Content repository error: {0}")]
    Repository(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod retrieval;

#[cfg(test)]
pub(crate) mod test_support;
