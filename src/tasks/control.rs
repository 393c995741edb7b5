//! Task queries and control (cancel, delete, download)

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{TaskRegistry, lock};
use crate::cache::CachedFile;
use crate::error::{Result, TaskError};
use crate::progress::Subscription;
use crate::types::{OutputFile, OutputFileType, TaskId, TaskInfo, TaskStats, TaskStatus};

/// Largest accepted page size for [`TaskRegistry::list_page`]
pub const MAX_PAGE_SIZE: usize = 100;

/// One page of tasks
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskPage {
    /// Tasks on this page, oldest first
    pub tasks: Vec<TaskInfo>,
    /// Total matching tasks
    pub total: usize,
    /// 1-based page number
    pub page: usize,
    /// Page size used
    pub page_size: usize,
}

impl TaskRegistry {
    /// Snapshot of one task
    pub fn get(&self, id: TaskId) -> Result<TaskInfo> {
        let record = self.record(id)?;
        let snapshot = lock(&record).snapshot();
        Ok(snapshot)
    }

    /// Every task ordered by creation time (ties in submission order)
    pub fn list(&self) -> Vec<TaskInfo> {
        let mut rows: Vec<(u64, TaskInfo)> = self
            .records()
            .iter()
            .map(|record| {
                let record = lock(record);
                (record.seq, record.snapshot())
            })
            .collect();
        rows.sort_by(|(seq_a, a), (seq_b, b)| {
            a.created_at.cmp(&b.created_at).then(seq_a.cmp(seq_b))
        });
        rows.into_iter().map(|(_, info)| info).collect()
    }

    /// One page of [`list`](Self::list), optionally filtered by status
    ///
    /// `page` is 1-based; `page_size` is clamped to `1..=100`.
    pub fn list_page(&self, page: usize, page_size: usize, status: Option<TaskStatus>) -> TaskPage {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        let matching: Vec<TaskInfo> = self
            .list()
            .into_iter()
            .filter(|task| status.is_none_or(|s| task.status == s))
            .collect();
        let total = matching.len();
        let tasks = matching
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        TaskPage {
            tasks,
            total,
            page,
            page_size,
        }
    }

    /// Request cancellation
    ///
    /// A pending task is cancelled immediately. A processing task has its
    /// cancellation token fired and moves to `cancelled` once the engine observes
    /// it; until then it stays `processing` with `cancel_requested` set.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids, `InvalidState` (conflict) for terminal tasks.
    pub fn cancel(&self, id: TaskId) -> Result<TaskInfo> {
        let record = self.record(id)?;
        // Limiter before record
        let dequeued = self.limiter.remove(id);

        let mut record = lock(&record);
        match record.status() {
            TaskStatus::Pending => {
                record.info.cancel_requested = true;
                record.transition(
                    TaskStatus::Cancelled,
                    "cancel",
                    "cancelled before processing started",
                    Utc::now(),
                )?;
                record.cancel.cancel();
                self.hub.publish(record.event());
                tracing::info!(task_id = %id, dequeued, "pending task cancelled");
            }
            TaskStatus::Processing => {
                if !record.info.cancel_requested {
                    record.info.cancel_requested = true;
                    record.info.message = "cancellation requested".to_string();
                    record.info.updated_at = Utc::now();
                    record.cancel.cancel();
                    self.hub.publish(record.event());
                    tracing::info!(task_id = %id, "cancellation requested for running task");
                }
            }
            status => {
                return Err(TaskError::InvalidState {
                    id,
                    operation: "cancel".to_string(),
                    current_state: status.to_string(),
                }
                .into());
            }
        }

        Ok(record.snapshot())
    }

    /// Remove a task and, best-effort, the result files it produced
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids, `InvalidState` (conflict) while processing.
    pub async fn delete(&self, id: TaskId) -> Result<()> {
        let record = self.record(id)?;
        self.limiter.remove(id);

        let outputs = {
            let record = lock(&record);
            if record.status() == TaskStatus::Processing {
                return Err(TaskError::InvalidState {
                    id,
                    operation: "delete".to_string(),
                    current_state: record.status().to_string(),
                }
                .into());
            }
            record.cancel.cancel();
            record.info.output_files.clone()
        };

        self.map_mut().remove(&id);
        self.hub.remove(id);
        self.remove_outputs(id, &outputs).await;

        tracing::info!(task_id = %id, outputs = outputs.len(), "task deleted");
        Ok(())
    }

    pub(crate) async fn remove_outputs(&self, id: TaskId, outputs: &[OutputFile]) {
        for output in outputs {
            if let Err(e) = self.results.delete(&output.key).await
                && !e.is_not_found()
            {
                tracing::warn!(task_id = %id, key = %output.key, error = %e, "failed to remove task output");
            }
        }
    }

    /// Resolve an output of a completed task
    ///
    /// With `file_type` set, the first output of that type is returned; otherwise the
    /// first document output (glossaries only when nothing else exists).
    ///
    /// # Errors
    ///
    /// `NotFound` when the task is unknown, not completed, has no matching output,
    /// or the output was evicted from the result cache.
    pub async fn download(
        &self,
        id: TaskId,
        file_type: Option<OutputFileType>,
    ) -> Result<(OutputFile, CachedFile)> {
        let task = self.get(id)?;
        let output = select_output(&task, file_type).ok_or_else(|| TaskError::OutputMissing {
            id,
            what: file_type
                .map(|t| t.as_str().to_string())
                .unwrap_or_else(|| "any".to_string()),
        })?;

        let file = self.results.get(&output.key).await?;
        Ok((output, file))
    }

    /// Subscribe to a task's progress events
    ///
    /// The first event is the task's current state; the subscription ends after the
    /// terminal event.
    pub fn subscribe(&self, id: TaskId) -> Result<Subscription> {
        let record = self.record(id)?;
        let record = lock(&record);
        Ok(self.hub.subscribe(id, record.event()))
    }

    /// Task counts per status plus admission state
    pub fn stats(&self) -> TaskStats {
        let mut stats = TaskStats {
            max_concurrent: self.limiter.max_concurrent(),
            ..Default::default()
        };
        for record in self.records() {
            stats.total += 1;
            match lock(&record).status() {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

fn select_output(task: &TaskInfo, file_type: Option<OutputFileType>) -> Option<OutputFile> {
    if task.status != TaskStatus::Completed {
        return None;
    }
    let outputs = &task.output_files;
    match file_type {
        Some(wanted) => outputs.iter().find(|o| o.file_type == wanted),
        None => outputs
            .iter()
            .find(|o| o.file_type != OutputFileType::Glossary)
            .or_else(|| outputs.first()),
    }
    .cloned()
}
