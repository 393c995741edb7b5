//! Traits and types for translation engines

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::{TaskId, TranslationOptions};

/// Everything an engine needs to translate one document
#[derive(Debug, Clone)]
pub struct TranslationJob {
    /// Task being executed
    pub task_id: TaskId,
    /// Source document (pinned in the upload cache while the job runs)
    pub input_path: PathBuf,
    /// Original file name of the source document
    pub input_filename: String,
    /// Validated translation options
    pub options: TranslationOptions,
    /// Directory the engine writes its outputs into
    pub output_dir: PathBuf,
    /// Scratch directory for intermediate files
    pub work_dir: PathBuf,
}

/// One progress report from an engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineProgress {
    /// Engine-local progress in [0, 100]
    pub progress: f32,
    /// Stage name, if the engine reports one
    pub stage: Option<String>,
    /// Human-readable detail
    pub message: String,
}

/// Channel and cancellation handle handed to a running engine
///
/// Progress is sent over a bounded channel; when the runner falls behind, reports
/// are dropped rather than blocking the engine.
#[derive(Debug, Clone)]
pub struct EngineContext {
    progress_tx: mpsc::Sender<EngineProgress>,
    cancel: CancellationToken,
}

impl EngineContext {
    /// Create a context from a progress sender and a cancellation token
    pub fn new(progress_tx: mpsc::Sender<EngineProgress>, cancel: CancellationToken) -> Self {
        Self {
            progress_tx,
            cancel,
        }
    }

    /// Report progress without blocking; non-finite values are ignored
    pub fn report(&self, progress: f32, stage: Option<&str>, message: impl Into<String>) {
        if !progress.is_finite() {
            tracing::trace!(progress, "ignoring non-finite engine progress");
            return;
        }
        let update = EngineProgress {
            progress: progress.clamp(0.0, 100.0),
            stage: stage.map(str::to_string),
            message: message.into(),
        };
        if self.progress_tx.try_send(update).is_err() {
            tracing::trace!("engine progress channel full, dropping update");
        }
    }

    /// Cooperative cancellation point
    ///
    /// Returns `Err(Error::Cancelled)` once cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Trait for document translation engines
///
/// The engine is opaque to the task service: it receives a job, reports progress
/// through the context, checks for cancellation at its own checkpoints, and either
/// returns the paths of the files it produced or fails.
///
/// Returning `Err(Error::Cancelled)` marks the task cancelled; any other error
/// marks it failed.
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    /// Translate one document
    async fn translate(&self, job: TranslationJob, ctx: EngineContext) -> Result<Vec<PathBuf>>;

    /// Name of this engine implementation
    fn name(&self) -> &'static str;

    /// Whether the engine can actually translate (false for the no-op engine)
    fn is_available(&self) -> bool {
        true
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checkpoint_reports_cancellation() {
        let (tx, _rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        let ctx = EngineContext::new(tx, token.clone());

        assert!(ctx.checkpoint().is_ok());
        token.cancel();
        assert!(matches!(ctx.checkpoint(), Err(Error::Cancelled)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn report_drops_when_channel_is_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let ctx = EngineContext::new(tx, CancellationToken::new());

        ctx.report(10.0, Some("parse"), "first");
        ctx.report(20.0, None, "second");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.progress, 10.0);
        assert_eq!(first.stage.as_deref(), Some("parse"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn report_clamps_progress() {
        let (tx, mut rx) = mpsc::channel(2);
        let ctx = EngineContext::new(tx, CancellationToken::new());
        ctx.report(150.0, None, "");
        assert_eq!(rx.recv().await.unwrap().progress, 100.0);
    }

    #[tokio::test]
    async fn report_ignores_non_finite_progress() {
        let (tx, mut rx) = mpsc::channel(4);
        let ctx = EngineContext::new(tx, CancellationToken::new());
        ctx.report(f32::NAN, None, "nan");
        ctx.report(f32::NEG_INFINITY, None, "-inf");
        ctx.report(42.0, None, "real");

        let update = rx.recv().await.unwrap();
        assert_eq!(update.progress, 42.0);
        assert_eq!(update.message, "real");
        assert!(rx.try_recv().is_err());
    }
}
