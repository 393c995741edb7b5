//! Periodic maintenance sweep
//!
//! Each cycle the janitor:
//!
//! 1. Sweeps both caches (expired entries first, then LRU down to capacity)
//! 2. Fails processing tasks that exceeded `tasks.task_timeout`
//! 3. Fails non-terminal tasks whose input vanished for longer than
//!    `janitor.missing_resource_grace`
//! 4. Deletes terminal tasks older than `tasks.task_retention`, with their outputs
//! 5. Prunes finished progress channels older than `janitor.hub_grace`
//!
//! # Example
//!
//! ```no_run
//! use doctrans::{Config, Janitor, TaskRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = TaskRegistry::open(Config::default()).await?;
//! let shutdown = CancellationToken::new();
//!
//! let handle = Janitor::new(registry).spawn(shutdown.clone());
//! // ...
//! shutdown.cancel();
//! handle.await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::SweepReport;
use crate::tasks::{ReapedInput, TaskRegistry};
use crate::types::TaskId;

/// What one janitor cycle did
#[derive(Clone, Debug, Default)]
pub struct JanitorReport {
    /// Upload cache sweep
    pub upload_sweep: SweepReport,
    /// Result cache sweep
    pub result_sweep: SweepReport,
    /// Tasks failed for exceeding the task timeout
    pub timed_out: Vec<TaskId>,
    /// Tasks failed because their input vanished
    pub expired_inputs: Vec<ReapedInput>,
    /// Terminal tasks deleted after the retention window
    pub reaped: Vec<TaskId>,
    /// Progress channels dropped
    pub pruned_channels: usize,
}

impl JanitorReport {
    /// True when the cycle changed nothing
    pub fn is_empty(&self) -> bool {
        self.upload_sweep.is_empty()
            && self.result_sweep.is_empty()
            && self.timed_out.is_empty()
            && self.expired_inputs.is_empty()
            && self.reaped.is_empty()
            && self.pruned_channels == 0
    }
}

/// Background sweeper over the caches and the task registry
pub struct Janitor {
    registry: TaskRegistry,
}

impl Janitor {
    /// Create a janitor for `registry`, using its configuration for every bound
    pub fn new(registry: TaskRegistry) -> Self {
        Self { registry }
    }

    /// Run one maintenance cycle as of `now`
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> JanitorReport {
        let config = self.registry.config().clone();

        let upload_sweep = self.registry.uploads().sweep_at(now).await;
        let result_sweep = self.registry.results().sweep_at(now).await;

        let timed_out = self
            .registry
            .fail_timed_out(config.tasks.task_timeout, now);
        let expired_inputs = self
            .registry
            .fail_missing_inputs(config.janitor.missing_resource_grace, now)
            .await;
        let reaped = self
            .registry
            .reap_finished(config.tasks.task_retention, now)
            .await;
        let pruned_channels = self.registry.hub().prune(config.janitor.hub_grace);

        let report = JanitorReport {
            upload_sweep,
            result_sweep,
            timed_out,
            expired_inputs,
            reaped,
            pruned_channels,
        };

        if report.is_empty() {
            debug!("janitor cycle found nothing to do");
        } else {
            info!(
                uploads_expired = report.upload_sweep.expired,
                uploads_evicted = report.upload_sweep.evicted,
                results_expired = report.result_sweep.expired,
                results_evicted = report.result_sweep.evicted,
                freed_bytes = report.upload_sweep.freed_bytes + report.result_sweep.freed_bytes,
                timed_out = report.timed_out.len(),
                expired_inputs = report.expired_inputs.len(),
                reaped = report.reaped.len(),
                pruned_channels = report.pruned_channels,
                "janitor cycle complete"
            );
        }

        report
    }

    /// Run cycles every `janitor.interval` until `shutdown` fires
    ///
    /// The first cycle runs immediately.
    pub async fn run(self, shutdown: CancellationToken) {
        let period = self.registry.config().janitor.interval;
        info!(interval_secs = period.as_secs(), "janitor started");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("janitor shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.run_cycle(Utc::now()).await;
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) on the tokio runtime
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
