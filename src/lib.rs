//! # doctrans
//!
//! Asynchronous document-translation task server.
//!
//! Clients upload PDFs, submit translation tasks, follow their progress as a
//! stream of events, and download the produced documents. The translation
//! itself is delegated to a pluggable [`TranslationEngine`]; this crate owns
//! everything around it:
//!
//! - **Task registry** - the task state machine, with FIFO admission under a
//!   runtime-adjustable concurrency bound
//! - **File caches** - content-addressed upload and result stores with age and
//!   size eviction
//! - **Progress hub** - per-task and global event fan-out
//! - **Janitor** - periodic cache sweeps, task timeouts and retention
//! - **REST API** - an axum router with server-sent events and OpenAPI docs
//!
//! ## Quick Start
//!
//! ```no_run
//! use doctrans::{Config, Janitor, TaskRegistry, TranslationOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = TaskRegistry::open(Config::default()).await?;
//!     let shutdown = CancellationToken::new();
//!     Janitor::new(registry.clone()).spawn(shutdown.clone());
//!
//!     let pdf = std::fs::read("paper.pdf")?;
//!     let task_id = registry
//!         .submit_upload(&pdf, "paper.pdf", TranslationOptions::default())
//!         .await?;
//!
//!     let mut events = registry.subscribe(task_id)?;
//!     while let Some(event) = events.recv().await {
//!         println!("{}: {:.0}% {}", event.status, event.progress, event.message);
//!     }
//!
//!     shutdown.cancel();
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Content-addressed file caches
pub mod cache;
/// Configuration types
pub mod config;
/// Translation engine seam and implementations
pub mod engine;
/// Error types
pub mod error;
/// Periodic maintenance
pub mod janitor;
/// Admission control
pub mod limiter;
/// Logging setup
pub mod logging;
/// Progress event fan-out
pub mod progress;
/// Task registry and state machine (decomposed into focused submodules)
pub mod tasks;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use cache::{CacheStore, SweepReport};
pub use config::Config;
pub use engine::{CliEngine, EngineContext, NoOpEngine, TranslationEngine, TranslationJob};
pub use error::{ApiError, CacheError, Error, ErrorDetail, Result, TaskError, ToHttpStatus};
pub use janitor::{Janitor, JanitorReport};
pub use limiter::{ConcurrencyLimiter, LimiterSnapshot};
pub use progress::{ProgressHub, Subscription};
pub use tasks::{TaskPage, TaskRegistry};
pub use types::{
    CacheRole, CacheStats, OutputFile, OutputFileType, OutputMode, ProgressEvent, TaskId,
    TaskInfo, TaskStats, TaskStatus, TranslationOptions, UploadInfo, WatermarkMode,
};

use tokio_util::sync::CancellationToken;

/// Helper function to run the registry with graceful signal handling.
///
/// Waits for a termination signal, cancels `stop` (so the API server and
/// janitor wind down), then calls the registry's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use doctrans::{Config, TaskRegistry, run_with_shutdown};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = TaskRegistry::open(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(registry, CancellationToken::new()).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(registry: TaskRegistry, stop: CancellationToken) {
    wait_for_signal().await;
    stop.cancel();
    registry.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
