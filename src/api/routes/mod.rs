//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`uploads`] - Document upload and task submission
//! - [`tasks`] - Task queries, control and downloads
//! - [`events`] - Server-sent progress streams
//! - [`cache`] - Cache statistics and clearing
//! - [`system`] - Health, service configuration, OpenAPI

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{CacheRole, OutputFileType, TaskId, TaskStatus, TranslationOptions};

mod cache;
mod events;
mod system;
mod tasks;
mod uploads;

// Re-export all handlers so `routes::function_name` works
pub use cache::*;
pub use events::*;
pub use system::*;
pub use tasks::*;
pub use uploads::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Query parameters for GET /tasks
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
pub struct TaskListQuery {
    /// 1-based page number (default: 1)
    #[serde(default = "default_page")]
    pub page: usize,
    /// Tasks per page, at most 100 (default: 20)
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Only tasks in this status
    pub status: Option<TaskStatus>,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

/// Query parameters for GET /tasks/:id/download
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
pub struct DownloadQuery {
    /// Which output to download; the first document output when omitted
    pub file_type: Option<OutputFileType>,
}

/// Request body for POST /tasks/download/batch
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct BatchDownloadRequest {
    /// Tasks whose outputs go into the archive
    pub task_ids: Vec<TaskId>,
    /// Output types to include (default: mono and dual)
    #[serde(default)]
    pub file_types: Option<Vec<OutputFileType>>,
}

/// Query parameters for DELETE /cache/clear
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
pub struct ClearCacheQuery {
    /// Clear only this cache; both when omitted
    pub cache: Option<CacheRole>,
}

/// Request body for POST /translate/json
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(deny_unknown_fields)]
pub struct TranslateJsonRequest {
    /// Key returned by POST /upload
    pub file_id: String,
    /// Translation options (defaults when omitted)
    #[serde(default)]
    pub options: Option<TranslationOptions>,
}

/// Response for task submission
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmitResponse {
    /// Id of the created task
    pub task_id: TaskId,
    /// Status at creation (always `pending`)
    pub status: TaskStatus,
}

/// Parse a task id path segment; malformed ids are reported as unknown
pub(crate) fn parse_task_id(raw: &str) -> Result<TaskId> {
    raw.parse()
        .map_err(|_| Error::NotFound(format!("task {}", raw)))
}
