//! Task creation

use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use super::TaskRegistry;
use super::record::{NewTask, TaskRecord};
use crate::cache::PutHint;
use crate::error::{Error, Result};
use crate::types::{TaskId, TranslationOptions, UploadInfo};

impl TaskRegistry {
    /// Create a pending task for a document already in the upload cache
    ///
    /// # Errors
    ///
    /// - `ShuttingDown` once [`shutdown`](Self::shutdown) has started
    /// - `InvalidInput` when the options fail validation or `input_ref` does not
    ///   resolve in the upload cache
    ///
    /// No state is created on error.
    pub async fn submit(&self, input_ref: &str, options: TranslationOptions) -> Result<TaskId> {
        self.ensure_accepting()?;
        options.validate()?;

        let entry = match self.uploads.entry(input_ref).await {
            Some(entry) if self.uploads.contains(input_ref).await => entry,
            _ => {
                return Err(Error::InvalidInput(format!(
                    "unknown input reference: {}",
                    input_ref
                )));
            }
        };

        let id = TaskId::generate();
        let seq = self.run_state.next_seq.fetch_add(1, Ordering::SeqCst);
        let record = TaskRecord::new(
            NewTask {
                id,
                seq,
                input_ref: input_ref.to_string(),
                input_filename: entry
                    .file_name
                    .clone()
                    .unwrap_or_else(|| format!("{}.pdf", input_ref)),
                input_size: entry.size_bytes,
                options,
            },
            Utc::now(),
        );
        // Published first so it precedes the admission event
        self.hub.publish(record.event());
        self.map_mut().insert(id, Arc::new(Mutex::new(record)));
        self.limiter.enqueue(id);

        tracing::info!(
            task_id = %id,
            input_ref = %input_ref,
            size = entry.size_bytes,
            "task submitted"
        );

        self.dispatch();
        Ok(id)
    }

    /// Store a document in the upload cache and submit it in one step
    ///
    /// Options are validated before anything is stored. Oversize content is rejected
    /// with `FileTooLarge`.
    pub async fn submit_upload(
        &self,
        content: &[u8],
        file_name: &str,
        options: TranslationOptions,
    ) -> Result<TaskId> {
        self.ensure_accepting()?;
        options.validate()?;

        let key = self
            .uploads
            .put_bytes(content, PutHint::named(file_name))
            .await?;
        self.submit(&key, options).await
    }

    /// Store a document in the upload cache for later submission
    pub async fn upload(&self, content: &[u8], file_name: &str) -> Result<UploadInfo> {
        self.ensure_accepting()?;

        let key = self
            .uploads
            .put_bytes(content, PutHint::named(file_name))
            .await?;
        let entry = self
            .uploads
            .entry(&key)
            .await
            .ok_or_else(|| Error::Other(format!("upload {} vanished after store", key)))?;

        let max_age = chrono::Duration::from_std(self.uploads.limits().max_age)
            .unwrap_or_else(|_| chrono::Duration::days(1));

        tracing::info!(file_id = %key, file_name = %file_name, size = entry.size_bytes, "file uploaded");

        Ok(UploadInfo {
            file_id: key,
            filename: file_name.to_string(),
            file_size: entry.size_bytes,
            uploaded_at: entry.created_at,
            expires_at: entry.created_at + max_age,
        })
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }
}
