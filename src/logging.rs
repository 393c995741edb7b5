//! Logging setup for the server binary
//!
//! Console output always; when [`LoggingConfig::file`] is set, the same events
//! are also appended to that file through a non-blocking writer. `RUST_LOG`
//! overrides the configured level.

use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard flushes and closes the log file writer.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global tracing subscriber
///
/// # Errors
///
/// - `Config` when the level is not a valid filter directive
/// - `Io` when the log file's directory cannot be created
/// - `Other` when a global subscriber is already installed
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard> {
    let env_filter = build_filter(&config.level)?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false);

    let (file_layer, file_guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to install log subscriber: {}", e)))?;

    if let Some(path) = &config.file {
        tracing::info!(file = %path.display(), "logging to file");
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// `RUST_LOG` when set, otherwise the configured level
fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| Error::Config {
        message: format!("invalid log level {:?}: {}", level, e),
        key: Some("logging.level".to_string()),
    })
}

fn file_writer(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let file_name = path.file_name().ok_or_else(|| Error::Config {
        message: format!("log file path {} has no file name", path.display()),
        key: Some("logging.file".to_string()),
    })?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}
