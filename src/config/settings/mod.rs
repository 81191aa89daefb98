
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60 * 24 * 365;
pub const MAX_CACHE_TTL_SECS: u64 = 100 * DEFAULT_CACHE_TTL_SECS;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const HOME_ENV_VAR: &str = "CONTENT_RETRIEVAL_HOME";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dimension: u32,
    pub retry_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1/".to_string(),
            model: "text-embedding-ada-002".to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            retry_attempts: 3,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContentConfig {
    /// sqlx connection URL; defaults to `content.db` in the base directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    pub table: String,
    pub id_column: String,
    pub text_column: String,
    pub max_connections: u32,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            table: "articles".to_string(),
            id_column: "id".to_string(),
            text_column: "content".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub path: PathBuf,
    pub database: String,
    pub collection: String,
    /// Number of IVF partitions
    pub nlist: u32,
    /// Number of partitions probed per query
    pub nprobe: u32,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vectors"),
            database: "default".to_string(),
            collection: "articles".to_string(),
            nlist: 1024,
            nprobe: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub path: PathBuf,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cache.db"),
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { default_limit: 5 }
    }
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            embedding: EmbeddingConfig::default(),
            content: ContentConfig::default(),
            vector_store: VectorStoreConfig::default(),
            cache: CacheConfig::default(),
            search: SearchConfig::default(),
            base_dir: PathBuf::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid SQL identifier: {0:?} (letters, digits and underscores only)")]
    InvalidIdentifier(String),
    #[error("Invalid max connections: {0} (must be between 1 and 100)")]
    InvalidMaxConnections(u32),
    #[error("Invalid vector store name: {0:?} (letters, digits, '-' and '_' only)")]
    InvalidStoreName(String),
    #[error("Invalid nlist: {0} (must be between 1 and 65536)")]
    InvalidNlist(u32),
    #[error("Invalid nprobe: {0} (must be between 1 and nlist {1})")]
    InvalidNprobe(u32, u32),
    #[error("Invalid cache TTL: {0} seconds (must be between 1 and 100 years)")]
    InvalidCacheTtl(u64),
    #[error("Invalid default search limit: {0} (must be between 1 and 1000)")]
    InvalidSearchLimit(usize),
    #[error("Invalid request timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidRequestTimeout(u64),
    #[error("Invalid value for environment variable {name}: {value:?}")]
    InvalidEnvValue { name: &'static str, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Base directory holding `config.toml`, the vector store and the cache
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = std::env::var_os(HOME_ENV_VAR) {
            return Ok(PathBuf::from(dir));
        }

        dirs::home_dir()
            .map(|home| home.join(".content-retrieval"))
            .or_else(|| dirs::data_dir().map(|data| data.join("content-retrieval")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load from the default directory and apply environment overrides
    #[inline]
    pub fn load_default() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to determine config directory")?;
        let mut config = Self::load(&config_dir)?;
        config
            .apply_env_overrides(|name| std::env::var(name).ok())
            .context("Failed to apply environment overrides")?;
        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// Read `config.toml` from `config_dir`; validation is left to the caller
    /// so environment overrides can be applied first
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Apply overrides from the process environment.
    ///
    /// `lookup` resolves a variable name to its value; `load_default` passes
    /// `std::env::var`, tests pass a map.
    #[inline]
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.embedding.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.embedding.base_url = url;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(value) = lookup("EMBEDDING_DIMENSION") {
            self.embedding.dimension = parse_env("EMBEDDING_DIMENSION", value)?;
        }
        if let Some(url) = lookup("CONTENT_DATABASE_URL") {
            self.content.database_url = Some(url);
        }
        if let Some(path) = lookup("VECTOR_STORE_PATH") {
            self.vector_store.path = PathBuf::from(path);
        }
        if let Some(database) = lookup("VECTOR_DATABASE") {
            self.vector_store.database = database;
        }
        if let Some(collection) = lookup("VECTOR_COLLECTION") {
            self.vector_store.collection = collection;
        }
        if let Some(path) = lookup("CACHE_PATH") {
            self.cache.path = PathBuf::from(path);
        }
        if let Some(value) = lookup("SEARCH_LIMIT") {
            self.search.default_limit = parse_env("SEARCH_LIMIT", value)?;
        }
        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=600).contains(&self.request_timeout_secs) {
            return Err(ConfigError::InvalidRequestTimeout(
                self.request_timeout_secs,
            ));
        }
        self.embedding.validate()?;
        self.content.validate()?;
        self.vector_store.validate()?;

        if !(1..=MAX_CACHE_TTL_SECS).contains(&self.cache.ttl_secs) {
            return Err(ConfigError::InvalidCacheTtl(self.cache.ttl_secs));
        }

        if !(1..=1000).contains(&self.search.default_limit) {
            return Err(ConfigError::InvalidSearchLimit(self.search.default_limit));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[inline]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Root directory of the vector store
    #[inline]
    pub fn vector_store_path(&self) -> PathBuf {
        self.resolve_path(&self.vector_store.path)
    }

    /// Path of the SQLite embedding cache
    #[inline]
    pub fn cache_path(&self) -> PathBuf {
        self.resolve_path(&self.cache.path)
    }

    /// Connection URL of the content database
    #[inline]
    pub fn content_database_url(&self) -> String {
        self.content.database_url.clone().unwrap_or_else(|| {
            format!(
                "sqlite://{}?mode=ro",
                self.get_base_dir().join("content.db").display()
            )
        })
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.get_base_dir().join(path)
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint()?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(1..=8192).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    /// Base URL of the embeddings API, always ending in `/` so that
    /// relative joins keep the path prefix
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let mut url_str = self.base_url.trim().to_string();
        if !url_str.ends_with('/') {
            url_str.push('/');
        }

        let url = Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(url_str));
        }
        Ok(url)
    }
}

impl ContentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for identifier in [&self.table, &self.id_column, &self.text_column] {
            if !is_sql_identifier(identifier) {
                return Err(ConfigError::InvalidIdentifier(identifier.clone()));
            }
        }

        if !(1..=100).contains(&self.max_connections) {
            return Err(ConfigError::InvalidMaxConnections(self.max_connections));
        }

        Ok(())
    }
}

impl VectorStoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in [&self.database, &self.collection] {
            if !is_store_name(name) {
                return Err(ConfigError::InvalidStoreName(name.clone()));
            }
        }

        if !(1..=65536).contains(&self.nlist) {
            return Err(ConfigError::InvalidNlist(self.nlist));
        }

        if self.nprobe == 0 || self.nprobe > self.nlist {
            return Err(ConfigError::InvalidNprobe(self.nprobe, self.nlist));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvValue { name, value })
}

fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_store_name(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
