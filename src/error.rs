//! Error types for doctrans
//!
//! This module provides the error handling for the library, including:
//! - Domain-specific error types (task state, cache)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::TaskId;

/// Result type alias for doctrans operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for doctrans
///
/// Every core operation reports one of these. The variants follow the failure
/// taxonomy of the task service: bad input, unknown ids, state conflicts, engine
/// failures and exhausted resources.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "cache.upload.capacity_bytes")
        key: Option<String>,
    },

    /// Rejected before any state was created (bad reference, malformed options)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Upload exceeds the configured maximum file size
    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge {
        /// Size of the rejected content in bytes
        size: u64,
        /// Configured maximum size in bytes
        limit: u64,
    },

    /// Task-related error
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// Cache-related error
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// The translation engine raised an error or crashed
    #[error("engine failure: {0}")]
    EngineFailure(String),

    /// The engine observed a cancellation request at a checkpoint
    #[error("cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic not-found condition (unknown route resource, missing file)
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// External tool execution failed (translator binary)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (no engine configured, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Task-related errors
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task not found in the registry
    #[error("task {id} not found")]
    NotFound {
        /// The task ID that was not found
        id: TaskId,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} task {id} in state {current_state}")]
    InvalidState {
        /// The task ID that is in an invalid state for the operation
        id: TaskId,
        /// The operation that was attempted (e.g., "cancel", "delete")
        operation: String,
        /// The current state that prevents the operation (e.g., "completed")
        current_state: String,
    },

    /// Task has no output matching the request
    #[error("task {id} has no {what} output")]
    OutputMissing {
        /// The task ID whose output was requested
        id: TaskId,
        /// Description of the requested output (e.g., "mono", "any")
        what: String,
    },
}

/// Cache-related errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Key not present in the store (never stored, evicted, or cleared)
    #[error("{store} cache entry {key} not found")]
    NotFound {
        /// Store role ("upload" or "result")
        store: String,
        /// The missing key
        key: String,
    },

    /// Content cannot fit even after eviction
    #[error("{store} cache capacity exhausted: need {required} bytes, capacity {capacity} bytes")]
    CapacityExceeded {
        /// Store role ("upload" or "result")
        store: String,
        /// Number of bytes the operation needed
        required: u64,
        /// Configured capacity in bytes
        capacity: u64,
    },

    /// Writing the cache file failed
    #[error("failed to write cache file {path}: {reason}")]
    WriteFailed {
        /// Path that could not be written
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// An entry a task depends on was evicted or cleared before it was used
    #[error("resource expired: {store} cache entry {key} is no longer available")]
    Expired {
        /// Store role ("upload" or "result")
        store: String,
        /// The vanished key
        key: String,
    },
}

impl Error {
    /// True for errors that mean the referenced task or entry does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::Task(TaskError::NotFound { .. })
                | Error::Task(TaskError::OutputMissing { .. })
                | Error::Cache(CacheError::NotFound { .. })
        )
    }

    /// True for state conflicts (cancel after terminal, delete while processing)
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Task(TaskError::InvalidState { .. }))
    }

    /// True when a cache could not satisfy a store operation
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(
            self,
            Error::Cache(CacheError::CapacityExceeded { .. })
                | Error::Cache(CacheError::WriteFailed { .. })
        )
    }

    /// True when a resource a task relied on has expired from its cache
    pub fn is_resource_expired(&self) -> bool {
        matches!(self, Error::Cache(CacheError::Expired { .. }))
    }
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "task_not_found",
///     "message": "task error: task 6f1c... not found",
///     "details": {
///       "task_id": "6f1c..."
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "invalid_input")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("invalid_input", message)
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;
    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Error::Config { .. } => 400,
            Error::InvalidInput(_) => 400,

            // 413 Payload Too Large
            Error::FileTooLarge { .. } => 413,

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::Task(TaskError::NotFound { .. }) => 404,
            Error::Task(TaskError::OutputMissing { .. }) => 404,
            Error::Cache(CacheError::NotFound { .. }) => 404,

            // 410 Gone
            Error::Cache(CacheError::Expired { .. }) => 410,

            // 409 Conflict
            Error::Task(TaskError::InvalidState { .. }) => 409,
            Error::Cancelled => 409,

            // 507 Insufficient Storage
            Error::Cache(CacheError::CapacityExceeded { .. }) => 507,
            Error::Cache(CacheError::WriteFailed { .. }) => 507,

            // 500 Internal Server Error
            Error::EngineFailure(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - external translator failed
            Error::ExternalTool(_) => 502,

            // 501 Not Implemented
            Error::NotSupported(_) => 501,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidInput(_) => "invalid_input",
            Error::FileTooLarge { .. } => "file_too_large",
            Error::Task(e) => match e {
                TaskError::NotFound { .. } => "task_not_found",
                TaskError::InvalidState { .. } => "conflict",
                TaskError::OutputMissing { .. } => "output_not_found",
            },
            Error::Cache(e) => match e {
                CacheError::NotFound { .. } => "cache_entry_not_found",
                CacheError::CapacityExceeded { .. } => "resource_exhausted",
                CacheError::WriteFailed { .. } => "resource_exhausted",
                CacheError::Expired { .. } => "resource_expired",
            },
            Error::EngineFailure(_) => "engine_failure",
            Error::Cancelled => "cancelled",
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Task(TaskError::NotFound { id }) => Some(serde_json::json!({
                "task_id": id,
            })),
            Error::Task(TaskError::InvalidState {
                id,
                operation,
                current_state,
            }) => Some(serde_json::json!({
                "task_id": id,
                "operation": operation,
                "current_state": current_state,
            })),
            Error::Task(TaskError::OutputMissing { id, what }) => Some(serde_json::json!({
                "task_id": id,
                "output": what,
            })),
            Error::Cache(CacheError::NotFound { store, key })
            | Error::Cache(CacheError::Expired { store, key }) => Some(serde_json::json!({
                "cache": store,
                "key": key,
            })),
            Error::Cache(CacheError::CapacityExceeded {
                store,
                required,
                capacity,
            }) => Some(serde_json::json!({
                "cache": store,
                "required_bytes": required,
                "capacity_bytes": capacity,
            })),
            Error::FileTooLarge { size, limit } => Some(serde_json::json!({
                "size_bytes": size,
                "limit_bytes": limit,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
