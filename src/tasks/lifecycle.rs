//! Runtime bound changes and shutdown coordination.

use chrono::Utc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::{TaskRegistry, lock};
use crate::error::Result;
use crate::limiter::LimiterSnapshot;
use crate::types::TaskStatus;

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl TaskRegistry {
    /// Change the concurrency bound at runtime
    ///
    /// Raising the bound admits queued tasks right away. Lowering it never preempts
    /// running tasks; admissions pause until the running count drops below the new
    /// bound.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a bound of 0.
    pub fn set_max_concurrent(&self, max_concurrent: usize) -> Result<()> {
        self.limiter.set_max(max_concurrent)?;
        self.dispatch();
        Ok(())
    }

    /// Current concurrency bound
    pub fn max_concurrent(&self) -> usize {
        self.limiter.max_concurrent()
    }

    /// Queue and slot usage of the admission gate
    pub fn limiter_snapshot(&self) -> LimiterSnapshot {
        self.limiter.snapshot()
    }

    /// Gracefully shut down the registry
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting submissions (`ShuttingDown` from then on)
    /// 2. Cancels queued tasks and fires the cancellation token of running ones
    /// 3. Waits up to `tasks.shutdown_grace` for running engines to return
    /// 4. Fails whatever is still processing after the grace period
    pub async fn shutdown(&self) {
        tracing::info!("initiating graceful shutdown");

        self.run_state.accepting_new.store(false, Ordering::SeqCst);
        self.run_state.stopping.cancel();
        tracing::info!("stopped accepting new tasks");

        let cancelled = self.cancel_all();
        tracing::info!(
            pending_cancelled = cancelled,
            "signalled cancellation to all tasks"
        );

        let grace = self.config.tasks.shutdown_grace;
        match tokio::time::timeout(grace, self.wait_for_active_runs()).await {
            Ok(()) => tracing::info!("all running tasks settled"),
            Err(_) => {
                let abandoned = self.fail_processing("interrupted by shutdown");
                tracing::warn!(
                    abandoned,
                    grace_secs = grace.as_secs(),
                    "timeout waiting for running tasks, proceeding with shutdown"
                );
            }
        }

        tracing::info!("graceful shutdown complete");
    }

    /// Cancel queued tasks and signal running ones; returns how many pending tasks
    /// were cancelled
    fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for record in self.records() {
            let id = lock(&record).id();
            // Limiter before record
            self.limiter.remove(id);

            let mut record = lock(&record);
            match record.status() {
                TaskStatus::Pending => {
                    record.info.cancel_requested = true;
                    if record
                        .transition(
                            TaskStatus::Cancelled,
                            "shutdown",
                            "service shutting down",
                            Utc::now(),
                        )
                        .is_ok()
                    {
                        record.cancel.cancel();
                        self.hub.publish(record.event());
                        cancelled += 1;
                    }
                }
                TaskStatus::Processing => {
                    tracing::debug!(task_id = %id, "signalling cancellation");
                    record.info.cancel_requested = true;
                    record.cancel.cancel();
                }
                _ => {}
            }
        }
        cancelled
    }

    fn fail_processing(&self, reason: &str) -> usize {
        let mut failed = 0;
        let mut freed = 0;
        for record in self.records() {
            let mut record = lock(&record);
            if record.status() == TaskStatus::Processing && record.fail(reason, Utc::now()).is_ok()
            {
                self.hub.publish(record.event());
                if record.take_slot() {
                    freed += 1;
                }
                failed += 1;
            }
        }
        // Nothing is admitted while stopping, so no dispatch
        for _ in 0..freed {
            self.limiter.release();
        }
        failed
    }

    async fn wait_for_active_runs(&self) {
        loop {
            let active_count = self.run_state.active_runs.load(Ordering::SeqCst);
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "waiting for running tasks to settle");
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
    }
}
