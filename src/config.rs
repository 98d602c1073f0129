//! Configuration types for backup-ingest

use crate::error::{Error, Result};
use crate::types::JobId;
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};
use utoipa::ToSchema;

/// Main configuration for [`JobManager`](crate::JobManager)
///
/// Every field has a default, so an empty JSON object is a valid configuration.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Base directory for archives, extracted trees, indexes and the job store
    /// (default: "./data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Archive transfer settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry behavior for transient transfer failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Archive extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Search index settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Job store and lifecycle settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            download: DownloadConfig::default(),
            retry: RetryConfig::default(),
            extraction: ExtractionConfig::default(),
            index: IndexConfig::default(),
            persistence: PersistenceConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("invalid configuration in {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the manager cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.download.chunk_size == 0 {
            return Err(invalid("download.chunk_size", "must be greater than zero"));
        }
        if self.download.max_concurrent_jobs == 0 {
            return Err(invalid(
                "download.max_concurrent_jobs",
                "must be greater than zero",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid("retry.backoff_multiplier", "must be at least 1.0"));
        }
        if self.index.search_limit == 0 {
            return Err(invalid("index.search_limit", "must be greater than zero"));
        }
        Ok(())
    }

    /// Directory holding downloaded archives
    pub fn downloads_dir(&self) -> PathBuf {
        self.data_dir.join("downloads")
    }

    /// Directory holding one extracted tree per job
    pub fn extracted_dir(&self) -> PathBuf {
        self.data_dir.join("extracted")
    }

    /// Directory holding one index file per job
    pub fn indexes_dir(&self) -> PathBuf {
        self.data_dir.join("indexes")
    }

    /// Location of the persisted job store
    pub fn jobs_file(&self) -> PathBuf {
        self.persistence
            .jobs_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("jobs.json"))
    }

    /// Artifact locations for a job, derived only from its id
    pub fn job_paths(&self, id: &JobId) -> JobPaths {
        JobPaths {
            archive_path: self.downloads_dir().join(format!("{id}.zip")),
            extract_dir: self.extracted_dir().join(id.as_str()),
            index_path: self.indexes_dir().join(format!("{id}.sqlite3")),
        }
    }
}

fn invalid(key: &str, message: &str) -> Error {
    Error::Config {
        message: format!("{key} {message}"),
        key: Some(key.to_string()),
    }
}

/// Filesystem locations owned by a single job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobPaths {
    /// Downloaded archive
    pub archive_path: PathBuf,
    /// Extraction target directory
    pub extract_dir: PathBuf,
    /// Search index file
    pub index_path: PathBuf,
}

/// Archive transfer configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Bytes written per chunk before progress is reported (default: 1 MiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum number of jobs processed at the same time (default: 2)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// TCP connect timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Longest allowed stall between two body chunks (default: 60 seconds)
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Archive extraction configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExtractionConfig {
    /// Refuse to extract when the uncompressed size exceeds free disk space (default: true)
    #[serde(default = "default_true")]
    pub check_disk_space: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            check_disk_space: true,
        }
    }
}

/// Search index configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct IndexConfig {
    /// Maximum hits returned by a search (default: 25)
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Extensions of plain files indexed when no conversation export is present
    #[serde(default = "default_text_extensions")]
    pub text_extensions: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
            text_extensions: default_text_extensions(),
        }
    }
}

/// Job store and lifecycle configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Job store location (default: `<data_dir>/jobs.json`)
    #[serde(default)]
    pub jobs_file: Option<PathBuf>,

    /// Minimum time between two progress updates of a running job (default: 1 second)
    #[serde(default = "default_progress_interval", with = "duration_serde")]
    pub progress_persist_interval: Duration,

    /// How long shutdown waits for active workers (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            jobs_file: None,
            progress_persist_interval: default_progress_interval(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8420)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_chunk_size() -> usize {
    1024 * 1024
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    concat!("backup-ingest/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_search_limit() -> usize {
    25
}

fn default_text_extensions() -> Vec<String> {
    ["json", "txt", "md", "csv"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_progress_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8420))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
