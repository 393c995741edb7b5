//! doctrans-server - HTTP front end for the translation task registry
//!
//! Every flag has a `DOCTRANS_*` environment fallback.

use clap::{ArgAction, Parser};
use doctrans::config::{CacheLimits, Config};
use doctrans::{Janitor, TaskRegistry, api, logging, run_with_shutdown};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MB: u64 = 1024 * 1024;

/// How long to wait for the HTTP server to drain after shutdown
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "doctrans-server")]
#[command(about = "Serve PDF translation tasks over HTTP", version)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0", env = "DOCTRANS_HOST")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8000, env = "DOCTRANS_PORT")]
    port: u16,

    /// Debug logging and per-request tracing
    #[arg(long, env = "DOCTRANS_DEBUG")]
    debug: bool,

    /// Maximum concurrently processing tasks
    #[arg(long, default_value_t = 3, env = "DOCTRANS_MAX_CONCURRENT_TASKS")]
    max_concurrent_tasks: usize,

    /// Largest accepted upload in megabytes
    #[arg(long, default_value_t = 100, env = "DOCTRANS_MAX_FILE_SIZE_MB")]
    max_file_size_mb: u64,

    /// Root directory of the upload and result caches
    #[arg(long, env = "DOCTRANS_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Upload cache capacity in megabytes
    #[arg(long, default_value_t = 5 * 1024, env = "DOCTRANS_UPLOAD_CACHE_SIZE_MB")]
    upload_cache_size_mb: u64,

    /// Upload cache entry lifetime in hours
    #[arg(long, default_value_t = 24, env = "DOCTRANS_UPLOAD_CACHE_MAX_AGE_HOURS")]
    upload_cache_max_age_hours: u64,

    /// Result cache capacity in megabytes
    #[arg(long, default_value_t = 10 * 1024, env = "DOCTRANS_RESULT_CACHE_SIZE_MB")]
    result_cache_size_mb: u64,

    /// Result cache entry lifetime in hours
    #[arg(long, default_value_t = 168, env = "DOCTRANS_RESULT_CACHE_MAX_AGE_HOURS")]
    result_cache_max_age_hours: u64,

    /// Seconds a task may stay processing before it is failed
    #[arg(long, default_value_t = 7200, env = "DOCTRANS_TASK_TIMEOUT_SECS")]
    task_timeout_secs: u64,

    /// Seconds between janitor sweeps
    #[arg(long, default_value_t = 3600, env = "DOCTRANS_JANITOR_INTERVAL_SECS")]
    janitor_interval_secs: u64,

    /// Log level or filter directive (RUST_LOG takes precedence)
    #[arg(long, default_value = "info", env = "DOCTRANS_LOG_LEVEL")]
    log_level: String,

    /// Also write logs to this file
    #[arg(long, env = "DOCTRANS_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Translator executable (searched on PATH when omitted)
    #[arg(long, env = "DOCTRANS_ENGINE_COMMAND")]
    engine_command: Option<PathBuf>,

    /// Serve Swagger UI at /swagger-ui
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "DOCTRANS_SWAGGER_UI")]
    swagger_ui: bool,

    /// Send CORS headers
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "DOCTRANS_CORS")]
    cors: bool,

    /// Allowed CORS origins, comma separated ("*" for any)
    #[arg(long, default_value = "*", value_delimiter = ',', env = "DOCTRANS_CORS_ORIGINS")]
    cors_origins: Vec<String>,
}

impl Args {
    fn into_config(self) -> Config {
        let mut config = Config::default();

        config.api.bind_address = SocketAddr::new(self.host, self.port);
        config.api.debug = self.debug;
        config.api.swagger_ui = self.swagger_ui;
        config.api.cors_enabled = self.cors;
        config.api.cors_origins = self.cors_origins;

        config.tasks.max_concurrent_tasks = self.max_concurrent_tasks;
        config.tasks.max_file_size = self.max_file_size_mb.saturating_mul(MB);
        config.tasks.task_timeout = Duration::from_secs(self.task_timeout_secs);

        if let Some(cache_dir) = self.cache_dir {
            config.cache.cache_dir = cache_dir;
        }
        config.cache.upload = CacheLimits {
            capacity_bytes: self.upload_cache_size_mb.saturating_mul(MB),
            max_age: Duration::from_secs(self.upload_cache_max_age_hours.saturating_mul(3600)),
        };
        config.cache.result = CacheLimits {
            capacity_bytes: self.result_cache_size_mb.saturating_mul(MB),
            max_age: Duration::from_secs(self.result_cache_max_age_hours.saturating_mul(3600)),
        };

        config.janitor.interval = Duration::from_secs(self.janitor_interval_secs);

        config.logging.level = if self.debug {
            "debug".to_string()
        } else {
            self.log_level
        };
        config.logging.file = self.log_file;

        config.engine.command = self.engine_command;
        config
    }
}

#[tokio::main]
async fn main() {
    let config = Args::parse().into_config();

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        process::exit(2);
    }

    let log_guard = match logging::init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {}", e);
            process::exit(1);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %config.api.bind_address,
        cache_dir = %config.cache.cache_dir.display(),
        max_concurrent = config.tasks.max_concurrent_tasks,
        "starting doctrans-server"
    );

    let registry = match TaskRegistry::open(config).await {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!(error = %e, "failed to open task registry");
            process::exit(1);
        }
    };

    let stop = CancellationToken::new();
    let janitor = Janitor::new(registry.clone()).spawn(stop.clone());
    let mut server = tokio::spawn(api::start_api_server(registry.clone(), stop.clone()));

    let exit_code = tokio::select! {
        result = &mut server => {
            // The server only returns on its own when it failed to start or crashed
            match result {
                Ok(Ok(())) => tracing::warn!("API server exited unexpectedly"),
                Ok(Err(e)) => tracing::error!(error = %e, "API server failed"),
                Err(e) => tracing::error!(error = %e, "API server task panicked"),
            }
            stop.cancel();
            registry.shutdown().await;
            1
        }
        _ = run_with_shutdown(registry.clone(), stop.clone()) => {
            match tokio::time::timeout(SERVER_DRAIN_TIMEOUT, &mut server).await {
                Ok(_) => tracing::info!("API server drained"),
                Err(_) => {
                    tracing::warn!("API server did not drain in time, aborting open connections");
                    server.abort();
                }
            }
            0
        }
    };

    if let Err(e) = janitor.await {
        tracing::warn!(error = %e, "janitor task ended abnormally");
    }

    tracing::info!("doctrans-server stopped");
    drop(log_guard);
    process::exit(exit_code);
}
