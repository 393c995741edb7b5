//! Mutable task state and its transition rules

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TaskError};
use crate::types::{OutputFile, ProgressEvent, TaskId, TaskInfo, TaskStatus, TranslationOptions};

/// One task as held by the registry, behind its own mutex
#[derive(Debug)]
pub(crate) struct TaskRecord {
    pub(crate) info: TaskInfo,
    /// Insertion sequence, breaks `created_at` ties when listing
    pub(crate) seq: u64,
    /// Fired on cancel, timeout, missing input, or shutdown
    pub(crate) cancel: CancellationToken,
    /// When the janitor first saw the input reference missing
    pub(crate) input_missing_since: Option<DateTime<Utc>>,
    /// Set on admission, cleared by whichever path gives the limiter slot back
    holds_slot: bool,
}

pub(crate) struct NewTask {
    pub id: TaskId,
    pub seq: u64,
    pub input_ref: String,
    pub input_filename: String,
    pub input_size: u64,
    pub options: TranslationOptions,
}

impl TaskRecord {
    pub(crate) fn new(task: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            info: TaskInfo {
                id: task.id,
                status: TaskStatus::Pending,
                progress: 0.0,
                message: "queued".to_string(),
                stage: None,
                input_ref: task.input_ref,
                input_filename: task.input_filename,
                input_size: task.input_size,
                options: task.options,
                output_files: Vec::new(),
                error: None,
                cancel_requested: false,
                created_at: now,
                updated_at: now,
                started_at: None,
                finished_at: None,
            },
            seq: task.seq,
            cancel: CancellationToken::new(),
            input_missing_since: None,
            holds_slot: false,
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.info.id
    }

    pub(crate) fn status(&self) -> TaskStatus {
        self.info.status
    }

    pub(crate) fn snapshot(&self) -> TaskInfo {
        self.info.clone()
    }

    pub(crate) fn event(&self) -> ProgressEvent {
        ProgressEvent::from_task(&self.info)
    }

    /// Move to `next`, or fail with `InvalidState` naming `operation`
    pub(crate) fn transition(
        &mut self,
        next: TaskStatus,
        operation: &str,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.info.status.can_transition_to(next) {
            return Err(TaskError::InvalidState {
                id: self.info.id,
                operation: operation.to_string(),
                current_state: self.info.status.to_string(),
            }
            .into());
        }

        self.info.status = next;
        self.info.message = message.into();
        self.info.updated_at = now;

        match next {
            TaskStatus::Processing => self.info.started_at = Some(now),
            TaskStatus::Completed => {
                self.info.progress = 100.0;
                self.info.finished_at = Some(now);
            }
            TaskStatus::Failed | TaskStatus::Cancelled => self.info.finished_at = Some(now),
            TaskStatus::Pending => {}
        }

        Ok(())
    }

    pub(crate) fn claim_slot(&mut self) {
        self.holds_slot = true;
    }

    /// True exactly once per admission; the caller then owes the limiter a release
    pub(crate) fn take_slot(&mut self) -> bool {
        std::mem::take(&mut self.holds_slot)
    }

    pub(crate) fn complete(&mut self, outputs: Vec<OutputFile>, now: DateTime<Utc>) -> Result<()> {
        let count = outputs.len();
        self.transition(
            TaskStatus::Completed,
            "complete",
            format!("translation complete, {} file(s) produced", count),
            now,
        )?;
        self.info.output_files = outputs;
        Ok(())
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        let error = error.into();
        self.transition(TaskStatus::Failed, "fail", format!("failed: {}", error), now)?;
        self.info.error = Some(error);
        Ok(())
    }

    /// Apply an engine progress report; false when dropped
    ///
    /// Only processing tasks accept reports, and progress never moves backwards.
    pub(crate) fn apply_progress(
        &mut self,
        progress: f32,
        message: String,
        stage: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.info.status != TaskStatus::Processing || !progress.is_finite() {
            return false;
        }
        let progress = progress.clamp(0.0, 100.0);
        if progress < self.info.progress {
            return false;
        }

        self.info.progress = progress;
        self.info.message = message;
        if stage.is_some() {
            self.info.stage = stage;
        }
        self.info.updated_at = now;
        true
    }
}
