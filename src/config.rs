//! Configuration types for doctrans

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

use crate::error::{Error, Result};

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * MB;

/// Main configuration for the translation service
///
/// Fields are organized into logical sub-configs:
/// - [`api`](ApiConfig) - REST server binding, CORS, Swagger UI
/// - [`tasks`](TaskConfig) - admission bound, upload size limit, timeouts, retention
/// - [`cache`](CacheConfig) - cache directory and per-store limits
/// - [`janitor`](JanitorConfig) - background sweep cadence
/// - [`engine`](EngineConfig) - external translator binary
/// - [`logging`](LoggingConfig) - log level and optional log file
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Task execution settings
    #[serde(default)]
    pub tasks: TaskConfig,

    /// File cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Background sweep settings
    #[serde(default)]
    pub janitor: JanitorConfig,

    /// Translation engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Check cross-field constraints that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        if self.tasks.max_concurrent_tasks == 0 {
            return Err(Error::Config {
                message: "must be at least 1".to_string(),
                key: Some("tasks.max_concurrent_tasks".to_string()),
            });
        }

        if self.tasks.max_file_size == 0 {
            return Err(Error::Config {
                message: "must be greater than zero".to_string(),
                key: Some("tasks.max_file_size".to_string()),
            });
        }

        for (key, limits) in [
            ("cache.upload", &self.cache.upload),
            ("cache.result", &self.cache.result),
        ] {
            if limits.capacity_bytes == 0 {
                return Err(Error::Config {
                    message: "capacity must be greater than zero".to_string(),
                    key: Some(format!("{}.capacity_bytes", key)),
                });
            }
            if limits.max_age.is_zero() {
                return Err(Error::Config {
                    message: "max age must be greater than zero".to_string(),
                    key: Some(format!("{}.max_age", key)),
                });
            }
        }

        if self.tasks.max_file_size > self.cache.upload.capacity_bytes {
            return Err(Error::Config {
                message: format!(
                    "max file size ({} bytes) exceeds upload cache capacity ({} bytes)",
                    self.tasks.max_file_size, self.cache.upload.capacity_bytes
                ),
                key: Some("tasks.max_file_size".to_string()),
            });
        }

        if self.janitor.interval.is_zero() {
            return Err(Error::Config {
                message: "must be greater than zero".to_string(),
                key: Some("janitor.interval".to_string()),
            });
        }

        Ok(())
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:8000)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
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

    /// Trace every HTTP request and response (default: false)
    #[serde(default)]
    pub debug: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
            debug: false,
        }
    }
}

/// Task execution configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskConfig {
    /// Maximum concurrently processing tasks (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,

    /// Largest accepted upload in bytes (default: 100 MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Processing time after which the janitor force-fails a task (default: 2 hours)
    #[serde(default = "default_task_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub task_timeout: Duration,

    /// How long terminal tasks are kept before being reaped (default: 7 days)
    #[serde(default = "default_task_retention", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub task_retention: Duration,

    /// How long shutdown waits for running engines to settle (default: 10 seconds)
    #[serde(default = "default_shutdown_grace", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub shutdown_grace: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent(),
            max_file_size: default_max_file_size(),
            task_timeout: default_task_timeout(),
            task_retention: default_task_retention(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

/// Size and age bounds for one cache store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CacheLimits {
    /// Total bytes the store may hold after a sweep
    pub capacity_bytes: u64,

    /// Entries older than this are evicted by a sweep
    #[serde(with = "duration_serde")]
    #[schema(value_type = u64)]
    pub max_age: Duration,
}

impl CacheLimits {
    /// Upload cache defaults: 5 GB, 1 day
    pub fn upload_default() -> Self {
        Self {
            capacity_bytes: 5 * GB,
            max_age: Duration::from_secs(24 * 3600),
        }
    }

    /// Result cache defaults: 10 GB, 7 days
    pub fn result_default() -> Self {
        Self {
            capacity_bytes: 10 * GB,
            max_age: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// File cache configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CacheConfig {
    /// Root directory; stores live in `uploads/`, `results/` and scratch space in `work/`
    #[serde(default = "default_cache_dir")]
    #[schema(value_type = String)]
    pub cache_dir: PathBuf,

    /// Upload cache bounds
    #[serde(default = "CacheLimits::upload_default")]
    pub upload: CacheLimits,

    /// Result cache bounds
    #[serde(default = "CacheLimits::result_default")]
    pub result: CacheLimits,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            upload: CacheLimits::upload_default(),
            result: CacheLimits::result_default(),
        }
    }
}

impl CacheConfig {
    /// Directory of the upload store
    pub fn upload_dir(&self) -> PathBuf {
        self.cache_dir.join("uploads")
    }

    /// Directory of the result store
    pub fn result_dir(&self) -> PathBuf {
        self.cache_dir.join("results")
    }

    /// Scratch space for running engines
    pub fn work_dir(&self) -> PathBuf {
        self.cache_dir.join("work")
    }
}

/// Background janitor configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JanitorConfig {
    /// Time between sweeps (default: 1 hour)
    #[serde(default = "default_janitor_interval", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub interval: Duration,

    /// How long a missing input may stay missing before the task fails (default: 60 seconds)
    #[serde(default = "default_missing_resource_grace", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub missing_resource_grace: Duration,

    /// How long finished progress channels stay subscribable (default: 1 hour)
    #[serde(default = "default_hub_grace", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub hub_grace: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval: default_janitor_interval(),
            missing_resource_grace: default_missing_resource_grace(),
            hub_grace: default_hub_grace(),
        }
    }
}

/// External translator configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EngineConfig {
    /// Path to the translator executable (auto-detected if None)
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub command: Option<PathBuf>,

    /// Name looked up on PATH when `command` is not set (default: "babeldoc")
    #[serde(default = "default_engine_binary")]
    pub binary_name: String,

    /// Whether to search PATH for the translator (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Extra arguments passed before the per-task arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: None,
            binary_name: default_engine_binary(),
            search_path: true,
            extra_args: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LoggingConfig {
    /// Default level filter when RUST_LOG is unset (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write logs to this file
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    3
}

fn default_max_file_size() -> u64 {
    100 * MB
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(2 * 3600)
}

fn default_task_retention() -> Duration {
    Duration::from_secs(7 * 24 * 3600)
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(10)
}

fn default_cache_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".doctrans")
        .join("cache")
}

fn default_janitor_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_missing_resource_grace() -> Duration {
    Duration::from_secs(60)
}

fn default_hub_grace() -> Duration {
    Duration::from_secs(3600)
}

fn default_engine_binary() -> String {
    "babeldoc".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// Duration serialization helper (whole seconds)
pub(crate) mod duration_serde {
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

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.tasks.max_concurrent_tasks, 3);
        assert_eq!(config.tasks.max_file_size, 100 * MB);
        assert_eq!(config.cache.upload.capacity_bytes, 5 * GB);
        assert_eq!(config.cache.result.capacity_bytes, 10 * GB);
        assert_eq!(config.cache.upload.max_age, Duration::from_secs(86_400));
        assert_eq!(config.cache.result.max_age, Duration::from_secs(604_800));
        assert_eq!(config.api.bind_address.port(), 8000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");
        assert_eq!(config.tasks.max_concurrent_tasks, 3);
        assert_eq!(config.janitor.interval, Duration::from_secs(3600));
        assert_eq!(config.engine.binary_name, "babeldoc");
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let config = Config::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["tasks"]["task_retention"], 604_800);
        assert_eq!(json["cache"]["upload"]["max_age"], 86_400);
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.tasks.max_concurrent_tasks = 0;
        let err = config.validate().unwrap_err();
        match err {
            Error::Config { key, .. } => {
                assert_eq!(key.as_deref(), Some("tasks.max_concurrent_tasks"))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_file_limit_above_upload_capacity() {
        let mut config = Config::default();
        config.cache.upload.capacity_bytes = 10 * MB;
        assert!(config.validate().is_err());
    }

    #[test]
    fn cache_subdirectories_hang_off_cache_dir() {
        let config = CacheConfig {
            cache_dir: PathBuf::from("/tmp/x"),
            ..Default::default()
        };
        assert_eq!(config.upload_dir(), PathBuf::from("/tmp/x/uploads"));
        assert_eq!(config.result_dir(), PathBuf::from("/tmp/x/results"));
        assert_eq!(config.work_dir(), PathBuf::from("/tmp/x/work"));
    }
}
