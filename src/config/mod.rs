//! Configuration management for floatchat
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,

    /// Qdrant collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Relational store configuration
    #[serde(default)]
    pub stores: StoresConfig,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Narrator (LLM summarizer) configuration
    #[serde(default)]
    pub narrator: NarratorConfig,

    /// Query routing configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Answer rendering configuration
    #[serde(default)]
    pub answer: AnswerConfig,

    /// Read API configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Remote mirror ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Root URL of the remote directory tree
    #[serde(default = "default_remote_root_url")]
    pub remote_root_url: String,

    /// File name patterns accepted for download
    #[serde(default = "default_accept_globs")]
    pub accept_globs: Vec<String>,

    /// Year subtrees to traverse (empty = all)
    #[serde(default)]
    pub years: Vec<String>,

    /// Month subtrees to traverse (empty = all)
    #[serde(default)]
    pub months: Vec<String>,

    /// Maximum files downloaded per tick
    #[serde(default = "default_file_budget_per_tick")]
    pub file_budget_per_tick: usize,

    /// Per-file download timeout in seconds
    #[serde(default = "default_per_file_timeout_secs")]
    pub per_file_timeout_secs: u64,

    /// Maximum retries per transient failure
    #[serde(default = "default_retry_max")]
    pub retry_max: u32,

    /// Base for exponential retry backoff, seconds
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Wall-clock budget for one tick, seconds
    #[serde(default = "default_tick_wall_clock_secs")]
    pub tick_wall_clock_secs: u64,

    /// Fraction of failed files tolerated before the run is an error
    #[serde(default = "default_error_rate_tolerance")]
    pub error_rate_tolerance: f64,

    /// Consecutive store write faults that abort the tick
    #[serde(default = "default_consecutive_write_fault_limit")]
    pub consecutive_write_fault_limit: usize,

    /// User agent string
    #[serde(default = "default_crawl_user_agent")]
    pub user_agent: String,

    /// Directory-listing request timeout in seconds
    #[serde(default = "default_listing_timeout_secs")]
    pub listing_timeout_secs: u64,

    /// Maximum directory pages fetched per discovery pass
    #[serde(default = "default_max_listing_pages")]
    pub max_listing_pages: usize,
}

/// Relational store configuration
///
/// The dev and live stores share one schema but allocate global profile
/// IDs from disjoint half-open ranges fixed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoresConfig {
    /// Half-open `[start, end)` ID range for the dev snapshot store
    #[serde(default = "default_dev_id_range")]
    pub dev_id_range: [i64; 2],

    /// Half-open `[start, end)` ID range for the live store
    #[serde(default = "default_live_id_range")]
    pub live_id_range: [i64; 2],
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding backend URL (OpenAI-compatible /embeddings endpoint)
    #[serde(default = "default_embedding_backend_url")]
    pub backend_url: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

/// Narrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarratorConfig {
    /// Enable LLM narration for informational answers
    #[serde(default)]
    pub enabled: bool,

    /// Chat-completions backend URL
    #[serde(default = "default_narrator_backend_url")]
    pub backend_url: String,

    /// Model name passed to the backend
    #[serde(default)]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_narrator_timeout_secs")]
    pub timeout_secs: u64,
}

/// Query routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Hard cap on rows fetched by any guarded query
    #[serde(default = "default_row_cap")]
    pub row_cap: usize,

    /// LIMIT applied to raw (non-aggregated) lookups
    #[serde(default = "default_raw_row_limit")]
    pub raw_row_limit: usize,

    /// SQL execution timeout in seconds
    #[serde(default = "default_sql_timeout_secs")]
    pub sql_timeout_secs: u64,

    /// Result cache TTL in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Result cache entry bound
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Default top-k for vector search
    #[serde(default = "default_top_k")]
    pub top_k_default: usize,

    /// Depth-bin width for aggregated queries, meters
    #[serde(default = "default_depth_bin_meters")]
    pub depth_bin_meters: f64,

    /// Maximum binned depth for aggregated queries, meters
    #[serde(default = "default_depth_bin_max_meters")]
    pub depth_bin_max_meters: f64,
}

/// Answer rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    /// Sentence budget for informational answers
    #[serde(default = "default_max_sentences_informational")]
    pub max_sentences_informational: usize,

    /// Sentence budget for data answers
    #[serde(default = "default_max_sentences_data")]
    pub max_sentences_data: usize,
}

/// Read API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP server
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for floatchat data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to the dev snapshot SQLite database
    pub dev_db_file: PathBuf,

    /// Path to the live SQLite database
    pub live_db_file: PathBuf,

    /// Directory for downloaded profile files
    pub download_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
            collection_name: default_collection_name(),
            ingest: IngestConfig::default(),
            stores: StoresConfig::default(),
            embedding: EmbeddingConfig::default(),
            narrator: NarratorConfig::default(),
            query: QueryConfig::default(),
            answer: AnswerConfig::default(),
            server: ServerConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            remote_root_url: default_remote_root_url(),
            accept_globs: default_accept_globs(),
            years: Vec::new(),
            months: Vec::new(),
            file_budget_per_tick: default_file_budget_per_tick(),
            per_file_timeout_secs: default_per_file_timeout_secs(),
            retry_max: default_retry_max(),
            backoff_base_secs: default_backoff_base_secs(),
            tick_wall_clock_secs: default_tick_wall_clock_secs(),
            error_rate_tolerance: default_error_rate_tolerance(),
            consecutive_write_fault_limit: default_consecutive_write_fault_limit(),
            user_agent: default_crawl_user_agent(),
            listing_timeout_secs: default_listing_timeout_secs(),
            max_listing_pages: default_max_listing_pages(),
        }
    }
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            dev_id_range: default_dev_id_range(),
            live_id_range: default_live_id_range(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend_url: default_embedding_backend_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend_url: default_narrator_backend_url(),
            model: String::new(),
            timeout_secs: default_narrator_timeout_secs(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            row_cap: default_row_cap(),
            raw_row_limit: default_raw_row_limit(),
            sql_timeout_secs: default_sql_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
            top_k_default: default_top_k(),
            depth_bin_meters: default_depth_bin_meters(),
            depth_bin_max_meters: default_depth_bin_max_meters(),
        }
    }
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            max_sentences_informational: default_max_sentences_informational(),
            max_sentences_data: default_max_sentences_data(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

impl Config {
    /// Get the default base directory for floatchat (~/.floatchat)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".floatchat")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            dev_db_file: base.join("dev.db"),
            live_db_file: base.join("live.db"),
            download_dir: base.join("downloads"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            dev_db_file: base.join("dev.db"),
            live_db_file: base.join("live.db"),
            download_dir: base.join("downloads"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to
    /// defaults when no config file exists yet
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        if self.qdrant_api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.qdrant_api_key_env).ok()
    }

    /// Path to a store's crawl fingerprint map
    pub fn fingerprint_file(&self, store: &str) -> PathBuf {
        self.paths
            .base_dir
            .join(format!("fingerprints-{}.json", store))
    }

    /// Path to a store's ingestion lock file
    pub fn ingest_lock_file(&self, store: &str) -> PathBuf {
        self.paths.base_dir.join(format!("ingest-{}.lock", store))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let [dev_start, dev_end] = self.stores.dev_id_range;
        let [live_start, live_end] = self.stores.live_id_range;

        if dev_start <= 0 || dev_start >= dev_end {
            return Err(Error::Config(
                "stores.dev_id_range must be a non-empty positive range".to_string(),
            ));
        }

        if live_start >= live_end {
            return Err(Error::Config(
                "stores.live_id_range must be a non-empty range".to_string(),
            ));
        }

        if live_start < dev_end {
            return Err(Error::Config(
                "stores.live_id_range must start at or above the dev range end".to_string(),
            ));
        }

        if self.ingest.file_budget_per_tick == 0 {
            return Err(Error::Config(
                "ingest.file_budget_per_tick must be positive".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.ingest.error_rate_tolerance) {
            return Err(Error::Config(
                "ingest.error_rate_tolerance must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.query.depth_bin_meters <= 0.0 {
            return Err(Error::Config(
                "query.depth_bin_meters must be positive".to_string(),
            ));
        }

        if self.query.depth_bin_max_meters < self.query.depth_bin_meters {
            return Err(Error::Config(
                "query.depth_bin_max_meters must be >= query.depth_bin_meters".to_string(),
            ));
        }

        if self.query.raw_row_limit == 0 || self.query.raw_row_limit > self.query.row_cap {
            return Err(Error::Config(
                "query.raw_row_limit must be positive and <= query.row_cap".to_string(),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.collection_name, "floatchat_profiles");
        assert_eq!(config.query.depth_bin_meters, 50.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.collection_name = "test_collection".to_string();
        config.ingest.years = vec!["2025".to_string()];

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.collection_name, "test_collection");
        assert_eq!(loaded.ingest.years, vec!["2025".to_string()]);
    }

    #[test]
    fn test_id_range_validation() {
        let mut config = Config::default();

        // Overlapping ranges are rejected
        config.stores.dev_id_range = [1, 2_000_000];
        config.stores.live_id_range = [1_000_000, 5_000_000];
        assert!(config.validate().is_err());

        // Disjoint ranges pass
        config.stores.live_id_range = [2_000_000, 5_000_000];
        assert!(config.validate().is_ok());

        // Empty range is rejected
        config.stores.dev_id_range = [10, 10];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_depth_bin_validation() {
        let mut config = Config::default();
        config.query.depth_bin_meters = 0.0;
        assert!(config.validate().is_err());

        config.query.depth_bin_meters = 100.0;
        config.query.depth_bin_max_meters = 50.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_scoped_paths() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));

        assert_ne!(
            config.fingerprint_file("dev"),
            config.fingerprint_file("live")
        );
        assert!(config
            .ingest_lock_file("live")
            .to_string_lossy()
            .contains("live"));
    }
}
