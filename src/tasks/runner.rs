//! Admission and engine execution

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;

use super::record::TaskRecord;
use super::{TaskRegistry, lock};
use crate::cache::PutHint;
use crate::engine::{EngineContext, EngineProgress, TranslationJob};
use crate::error::{CacheError, Error, Result};
use crate::types::{CacheRole, OutputFile, OutputFileType, TaskId, TaskStatus};

/// Engine progress is mapped into this band; the rest covers setup and result storage
const ENGINE_PROGRESS_START: f32 = 20.0;
const ENGINE_PROGRESS_END: f32 = 95.0;
const PROGRESS_CHANNEL_CAPACITY: usize = 32;

/// Ends an engine run, however it ends
///
/// The limiter slot is normally handed back when the task turns terminal; the
/// guard only releases it if no other path has.
struct SlotGuard {
    registry: TaskRegistry,
    id: TaskId,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let held = self
            .registry
            .record(self.id)
            .map(|record| lock(&record).take_slot())
            .unwrap_or(false);
        if held {
            self.registry.limiter.release();
        }
        self.registry
            .run_state
            .active_runs
            .fetch_sub(1, Ordering::SeqCst);
        self.registry.dispatch();
    }
}

impl TaskRegistry {
    /// Admit queued tasks while slots are free and start their engine runs
    pub(crate) fn dispatch(&self) {
        if !self.is_accepting() {
            return;
        }

        let admitted = self.limiter.try_admit(|id| self.admit(id));
        for id in admitted {
            self.run_state.active_runs.fetch_add(1, Ordering::SeqCst);
            let guard = SlotGuard {
                registry: self.clone(),
                id,
            };
            let registry = self.clone();
            tokio::spawn(async move {
                registry.run_task(id).await;
                drop(guard);
            });
        }
    }

    /// Called under the limiter lock for each dequeued id
    fn admit(&self, id: TaskId) -> bool {
        let Some(record) = self.map().get(&id).cloned() else {
            return false;
        };
        let mut record = lock(&record);
        if record.status() != TaskStatus::Pending {
            return false;
        }
        if record
            .transition(TaskStatus::Processing, "admit", "processing", Utc::now())
            .is_err()
        {
            return false;
        }
        record.claim_slot();
        self.hub.publish(record.event());
        tracing::info!(task_id = %id, "task admitted");
        true
    }

    /// Give back a slot taken from a record that left `processing`, then admit
    ///
    /// Must not be called with a record lock held.
    pub(crate) fn free_slot(&self) {
        self.limiter.release();
        self.dispatch();
    }

    /// Apply an engine progress report
    ///
    /// Reports for tasks that are not processing, and reports whose progress is
    /// lower than the current value, are dropped. Returns whether it was applied.
    pub fn report(
        &self,
        id: TaskId,
        progress: f32,
        message: impl Into<String>,
        stage: Option<String>,
    ) -> bool {
        let Ok(record) = self.record(id) else {
            return false;
        };
        let mut record = lock(&record);
        if !record.apply_progress(progress, message.into(), stage, Utc::now()) {
            return false;
        }
        self.hub.publish(record.event());
        true
    }

    /// Move a running task to a terminal state; false when it was already terminal
    fn finish(&self, id: TaskId, outcome: Outcome) -> bool {
        let Ok(record) = self.record(id) else {
            return false;
        };
        let (applied, freed) = self.finish_record(&mut lock(&record), id, &outcome);
        if freed {
            self.free_slot();
        }
        applied
    }

    fn finish_record(&self, record: &mut TaskRecord, id: TaskId, outcome: &Outcome) -> (bool, bool) {
        let now = Utc::now();

        let applied = match outcome {
            Outcome::Completed(outputs) => record.complete(outputs.clone(), now),
            Outcome::Failed(error) => record.fail(error.clone(), now),
            Outcome::Cancelled => record.transition(
                TaskStatus::Cancelled,
                "cancel",
                "cancelled",
                now,
            ),
        };

        match applied {
            Ok(()) => {
                self.hub.publish(record.event());
                match outcome {
                    Outcome::Completed(outputs) => {
                        tracing::info!(task_id = %id, outputs = outputs.len(), "task completed")
                    }
                    Outcome::Failed(error) => {
                        tracing::warn!(task_id = %id, error = %error, "task failed")
                    }
                    Outcome::Cancelled => tracing::info!(task_id = %id, "task cancelled"),
                }
                (true, record.take_slot())
            }
            Err(_) => {
                tracing::debug!(
                    task_id = %id,
                    status = %record.status(),
                    "task already terminal, dropping engine outcome"
                );
                (false, false)
            }
        }
    }

    /// Execute one admitted task to completion
    async fn run_task(&self, id: TaskId) {
        let scratch = self.config.cache.work_dir().join(id.to_string());

        let outcome = match self.execute(id, &scratch).await {
            Ok(outputs) => Outcome::Completed(outputs),
            Err(Error::Cancelled) => Outcome::Cancelled,
            Err(e) => Outcome::Failed(failure_reason(&e)),
        };

        let stored = match &outcome {
            Outcome::Completed(outputs) => outputs.clone(),
            _ => Vec::new(),
        };
        if !self.finish(id, outcome) && !stored.is_empty() {
            // Lost the race to a timeout or missing-input failure
            self.remove_outputs(id, &stored).await;
        }

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(task_id = %id, dir = %scratch.display(), error = %e, "failed to remove scratch directory");
        }
    }

    async fn execute(&self, id: TaskId, scratch: &Path) -> Result<Vec<OutputFile>> {
        let (input_ref, input_filename, options, token) = {
            let record = self.record(id)?;
            let record = lock(&record);
            (
                record.info.input_ref.clone(),
                record.info.input_filename.clone(),
                record.info.options.clone(),
                record.cancel.clone(),
            )
        };

        self.report(id, 5.0, "loading input", Some("prepare".to_string()));

        // Pinned until this function returns
        let input = self.uploads.get(&input_ref).await.map_err(|e| {
            if e.is_not_found() {
                CacheError::Expired {
                    store: CacheRole::Upload.to_string(),
                    key: input_ref.clone(),
                }
                .into()
            } else {
                e
            }
        })?;

        let output_dir = scratch.join("output");
        tokio::fs::create_dir_all(&output_dir).await?;

        let job = TranslationJob {
            task_id: id,
            input_path: input.path().to_path_buf(),
            input_filename,
            options,
            output_dir,
            work_dir: scratch.to_path_buf(),
        };

        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let ctx = EngineContext::new(progress_tx, token);
        let forwarder = tokio::spawn(forward_progress(self.clone(), id, progress_rx));

        self.report(
            id,
            ENGINE_PROGRESS_START,
            "translation started",
            Some("translate".to_string()),
        );
        tracing::debug!(task_id = %id, engine = self.engine.name(), "starting engine");

        let engine = self.engine.clone();
        let run = tokio::spawn(async move { engine.translate(job, ctx).await });
        let produced = match run.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(Error::EngineFailure("engine panicked".to_string())),
            Err(e) => Err(Error::EngineFailure(format!("engine task aborted: {}", e))),
        };

        // The context (and its sender) is gone once the engine returns
        forwarder.await.ok();

        let produced = produced?;
        self.report(
            id,
            ENGINE_PROGRESS_END,
            "storing results",
            Some("store".to_string()),
        );
        self.store_outputs(id, &produced).await
    }

    async fn store_outputs(&self, id: TaskId, produced: &[PathBuf]) -> Result<Vec<OutputFile>> {
        let mut outputs = Vec::with_capacity(produced.len());
        for path in produced {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "output.pdf".to_string());

            let stored = self
                .results
                .put_file(
                    path,
                    PutHint::named(file_name.clone()).in_namespace(id.to_string()),
                )
                .await;

            let key = match stored {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!(task_id = %id, file = %file_name, error = %e, "failed to store output");
                    self.remove_outputs(id, &outputs).await;
                    return Err(e);
                }
            };

            let size_bytes = self
                .results
                .entry(&key)
                .await
                .map(|entry| entry.size_bytes)
                .unwrap_or_default();
            let (file_type, watermark) = OutputFileType::from_file_name(&file_name);

            outputs.push(OutputFile {
                key,
                file_name,
                file_type,
                size_bytes,
                watermark,
            });
        }
        Ok(outputs)
    }
}

/// Message recorded on a failed task; cache failures lead with their class
fn failure_reason(error: &Error) -> String {
    match error {
        Error::Cache(e) if error.is_resource_exhausted() => format!("resource exhausted: {}", e),
        Error::Cache(e) => e.to_string(),
        e => e.to_string(),
    }
}

enum Outcome {
    Completed(Vec<OutputFile>),
    Failed(String),
    Cancelled,
}

/// Map engine-local progress into the task's engine band and apply it
async fn forward_progress(
    registry: TaskRegistry,
    id: TaskId,
    mut rx: mpsc::Receiver<EngineProgress>,
) {
    while let Some(update) = rx.recv().await {
        let progress = ENGINE_PROGRESS_START
            + update.progress * (ENGINE_PROGRESS_END - ENGINE_PROGRESS_START) / 100.0;
        let message = match (&update.stage, update.message.is_empty()) {
            (Some(stage), false) => format!("{}: {}", stage, update.message),
            (Some(stage), true) => stage.clone(),
            (None, _) => update.message.clone(),
        };
        registry.report(id, progress, message, update.stage);
    }
}
