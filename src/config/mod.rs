// Configuration management module
// TOML settings file plus environment overrides

pub mod settings;

pub use settings::{
    CacheConfig, Config, ConfigError, ContentConfig, EmbeddingConfig, SearchConfig,
    VectorStoreConfig,
};
