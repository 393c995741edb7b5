//! Periodic passes run by the janitor

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::{TaskRegistry, lock};
use crate::error::CacheError;
use crate::types::{CacheRole, TaskId, TaskStatus};

/// A task failed because its input vanished from the upload cache
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReapedInput {
    /// The failed task
    pub task_id: TaskId,
    /// Upload cache key that no longer resolves
    pub input_ref: String,
}

fn older_than(then: DateTime<Utc>, age: Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(then)
        .to_std()
        .map(|elapsed| elapsed > age)
        .unwrap_or(false)
}

impl TaskRegistry {
    /// Fail processing tasks that have been running longer than `timeout`
    ///
    /// Their cancellation token is fired so a cooperative engine stops. The slot is
    /// handed to the next queued task right away, whether or not the engine returns.
    pub fn fail_timed_out(&self, timeout: Duration, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut failed = Vec::new();
        let mut freed = 0;
        for record in self.records() {
            let mut record = lock(&record);
            if record.status() != TaskStatus::Processing {
                continue;
            }
            let Some(started_at) = record.info.started_at else {
                continue;
            };
            if !older_than(started_at, timeout, now) {
                continue;
            }

            let message = format!("timed out after {}s", timeout.as_secs());
            if record.fail(message, now).is_ok() {
                record.cancel.cancel();
                self.hub.publish(record.event());
                if record.take_slot() {
                    freed += 1;
                }
                tracing::warn!(task_id = %record.id(), timeout_secs = timeout.as_secs(), "task timed out");
                failed.push(record.id());
            }
        }
        for _ in 0..freed {
            self.free_slot();
        }
        failed
    }

    /// Fail non-terminal tasks whose input stayed missing for longer than `grace`
    ///
    /// The first cycle that notices a missing input only records the time; the task
    /// is failed with "resource expired" once `grace` has passed. Pending tasks are
    /// also dropped from the admission queue.
    pub async fn fail_missing_inputs(&self, grace: Duration, now: DateTime<Utc>) -> Vec<ReapedInput> {
        let candidates: Vec<(TaskId, String)> = self
            .records()
            .iter()
            .filter_map(|record| {
                let record = lock(record);
                (!record.status().is_terminal())
                    .then(|| (record.id(), record.info.input_ref.clone()))
            })
            .collect();

        let mut reaped = Vec::new();
        for (id, input_ref) in candidates {
            let present = self.uploads.contains(&input_ref).await;
            let Ok(record) = self.record(id) else {
                continue;
            };

            let expired = {
                let mut record = lock(&record);
                if record.status().is_terminal() {
                    continue;
                }
                if present {
                    record.input_missing_since = None;
                    continue;
                }
                let since = *record.input_missing_since.get_or_insert(now);
                now.signed_duration_since(since)
                    .to_std()
                    .map(|elapsed| elapsed >= grace)
                    .unwrap_or(false)
            };
            if !expired {
                continue;
            }

            // Limiter before record
            self.limiter.remove(id);
            let reason = CacheError::Expired {
                store: CacheRole::Upload.to_string(),
                key: input_ref.clone(),
            };
            let freed = {
                let mut record = lock(&record);
                if record.fail(reason.to_string(), now).is_err() {
                    continue;
                }
                record.cancel.cancel();
                self.hub.publish(record.event());
                record.take_slot()
            };
            if freed {
                self.free_slot();
            }
            tracing::warn!(task_id = %id, input_ref = %input_ref, "task input expired");
            reaped.push(ReapedInput {
                task_id: id,
                input_ref,
            });
        }
        reaped
    }

    /// Delete terminal tasks that finished more than `retention` ago, with their outputs
    pub async fn reap_finished(&self, retention: Duration, now: DateTime<Utc>) -> Vec<TaskId> {
        let expired: Vec<_> = self
            .records()
            .iter()
            .filter_map(|record| {
                let record = lock(record);
                let finished_at = record.info.finished_at?;
                (record.status().is_terminal() && older_than(finished_at, retention, now))
                    .then(|| (record.id(), record.info.output_files.clone()))
            })
            .collect();

        let mut reaped = Vec::with_capacity(expired.len());
        for (id, outputs) in expired {
            if self.map_mut().remove(&id).is_none() {
                continue;
            }
            self.hub.remove(id);
            self.remove_outputs(id, &outputs).await;
            tracing::debug!(task_id = %id, "reaped finished task");
            reaped.push(id);
        }
        reaped
    }
}
