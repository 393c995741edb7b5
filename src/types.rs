//! Core types for doctrans

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Unique identifier for a translation task
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a fresh random TaskId
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for TaskId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for admission
    Pending,
    /// Engine is running
    Processing,
    /// Engine finished and outputs are stored
    Completed,
    /// Engine failed, timed out, or its input expired
    Failed,
    /// Cancelled before or during processing
    Cancelled,
}

impl TaskStatus {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Lowercase name as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the state machine permits moving from `self` to `next`
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
                | (TaskStatus::Processing, TaskStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which document layouts the engine should produce
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Bilingual document only
    Dual,
    /// Translated-only document only
    Mono,
    /// Both dual and mono documents
    #[default]
    Both,
}

/// Watermark handling for produced documents
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkMode {
    /// Outputs carry a watermark
    #[default]
    Watermarked,
    /// Outputs without watermark
    NoWatermark,
    /// Both watermarked and clean variants
    Both,
}

/// Languages accepted for `lang_in` / `lang_out`
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("zh", "Chinese"),
    ("zh-cn", "Simplified Chinese"),
    ("zh-tw", "Traditional Chinese"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("fr", "French"),
    ("de", "German"),
    ("es", "Spanish"),
    ("ru", "Russian"),
    ("pt", "Portuguese"),
    ("it", "Italian"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
    ("th", "Thai"),
    ("vi", "Vietnamese"),
    ("nl", "Dutch"),
    ("sv", "Swedish"),
    ("da", "Danish"),
    ("no", "Norwegian"),
    ("fi", "Finnish"),
    ("tr", "Turkish"),
    ("pl", "Polish"),
    ("cs", "Czech"),
    ("hu", "Hungarian"),
];

/// Options for a translation task
///
/// Unknown fields are rejected during deserialization so that misspelled
/// options surface as errors instead of being silently ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct TranslationOptions {
    /// Source language code (default: "en")
    #[serde(default = "default_lang_in")]
    pub lang_in: String,

    /// Target language code (default: "zh")
    #[serde(default = "default_lang_out")]
    pub lang_out: String,

    /// Page selection such as "1,3-5,-2,7-" (None = all pages)
    #[serde(default)]
    pub pages: Option<String>,

    /// Which layouts to produce
    #[serde(default)]
    pub output_mode: OutputMode,

    /// Watermark handling
    #[serde(default)]
    pub watermark: WatermarkMode,

    /// Requests-per-second hint passed to the engine (default: 4)
    #[serde(default = "default_qps")]
    pub qps: u32,

    /// Free-form prompt text appended to the engine's system prompt
    #[serde(default)]
    pub custom_prompt: Option<String>,

    /// Minimum text length considered for translation (default: 5)
    #[serde(default = "default_min_text_length")]
    pub min_text_length: u32,

    /// Extract a glossary from the document while translating
    #[serde(default)]
    pub auto_extract_glossary: bool,

    /// Bypass any engine-side translation cache
    #[serde(default)]
    pub ignore_cache: bool,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            lang_in: default_lang_in(),
            lang_out: default_lang_out(),
            pages: None,
            output_mode: OutputMode::default(),
            watermark: WatermarkMode::default(),
            qps: default_qps(),
            custom_prompt: None,
            min_text_length: default_min_text_length(),
            auto_extract_glossary: false,
            ignore_cache: false,
        }
    }
}

/// Upper bound for the requests-per-second hint
pub const MAX_QPS: u32 = 1000;

/// Upper bound for custom prompt length in characters
pub const MAX_PROMPT_CHARS: usize = 8192;

impl TranslationOptions {
    /// Parse options from a JSON document, rejecting unknown fields
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("malformed options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Validate field values
    pub fn validate(&self) -> Result<()> {
        for (field, code) in [("lang_in", &self.lang_in), ("lang_out", &self.lang_out)] {
            if !is_supported_language(code) {
                return Err(Error::InvalidInput(format!(
                    "unsupported language for {}: {}",
                    field, code
                )));
            }
        }

        if let Some(pages) = &self.pages {
            validate_pages(pages)?;
        }

        if self.qps == 0 || self.qps > MAX_QPS {
            return Err(Error::InvalidInput(format!(
                "qps must be between 1 and {}, got {}",
                MAX_QPS, self.qps
            )));
        }

        if let Some(prompt) = &self.custom_prompt
            && prompt.chars().count() > MAX_PROMPT_CHARS
        {
            return Err(Error::InvalidInput(format!(
                "custom_prompt exceeds {} characters",
                MAX_PROMPT_CHARS
            )));
        }

        Ok(())
    }
}

/// Whether `code` is one of [`SUPPORTED_LANGUAGES`] (case-insensitive)
pub fn is_supported_language(code: &str) -> bool {
    SUPPORTED_LANGUAGES
        .iter()
        .any(|(c, _)| c.eq_ignore_ascii_case(code))
}

/// Validate a page selection: comma-separated `n`, `a-b`, `a-` or `-b` items, 1-based
fn validate_pages(pages: &str) -> Result<()> {
    let invalid = |part: &str| Error::InvalidInput(format!("invalid page selection: {:?}", part));

    if pages.trim().is_empty() {
        return Err(invalid(pages));
    }

    for part in pages.split(',') {
        let part = part.trim();
        let parse = |s: &str| -> Result<u32> {
            match s.parse::<u32>() {
                Ok(n) if n >= 1 => Ok(n),
                _ => Err(invalid(part)),
            }
        };

        match part.split_once('-') {
            None => {
                parse(part)?;
            }
            Some(("", "")) => return Err(invalid(part)),
            Some((start, "")) => {
                parse(start)?;
            }
            Some(("", end)) => {
                parse(end)?;
            }
            Some((start, end)) => {
                if parse(start)? > parse(end)? {
                    return Err(invalid(part));
                }
            }
        }
    }

    Ok(())
}

/// Kind of produced output file, inferred from its name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputFileType {
    /// Translated-only document
    Mono,
    /// Bilingual document
    Dual,
    /// Translated-only document without watermark
    MonoNoWatermark,
    /// Bilingual document without watermark
    DualNoWatermark,
    /// Extracted glossary
    Glossary,
}

impl OutputFileType {
    /// Infer the output kind and whether it carries a watermark from a file name
    ///
    /// Names follow the engine's convention: `doc.zh.mono.pdf`,
    /// `doc.zh.dual.no_watermark.pdf`, `doc.glossary.csv`. Unrecognized names
    /// fall back to a watermarked mono document.
    pub fn from_file_name(name: &str) -> (Self, bool) {
        let name = name.to_ascii_lowercase();

        if name.ends_with(".glossary.csv") {
            (OutputFileType::Glossary, false)
        } else if name.contains(".no_watermark.") {
            if name.contains(".dual.") {
                (OutputFileType::DualNoWatermark, false)
            } else {
                (OutputFileType::MonoNoWatermark, false)
            }
        } else if name.contains(".dual.") {
            (OutputFileType::Dual, true)
        } else {
            (OutputFileType::Mono, true)
        }
    }

    /// Snake-case name as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFileType::Mono => "mono",
            OutputFileType::Dual => "dual",
            OutputFileType::MonoNoWatermark => "mono_no_watermark",
            OutputFileType::DualNoWatermark => "dual_no_watermark",
            OutputFileType::Glossary => "glossary",
        }
    }

    /// Content type used when serving this output
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFileType::Glossary => "text/csv",
            _ => "application/pdf",
        }
    }
}

/// An output produced by a completed task (weak reference into the result cache)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OutputFile {
    /// Result cache key
    pub key: String,
    /// File name as produced by the engine
    pub file_name: String,
    /// Inferred output kind
    pub file_type: OutputFileType,
    /// Size in bytes
    pub size_bytes: u64,
    /// Whether the document carries a watermark
    pub watermark: bool,
}

/// Snapshot of a task's state
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskInfo {
    /// Task ID
    pub id: TaskId,
    /// Current status
    pub status: TaskStatus,
    /// Progress percentage (0.0 to 100.0)
    pub progress: f32,
    /// Last human-readable status message
    pub message: String,
    /// Last engine-reported stage
    pub stage: Option<String>,
    /// Upload cache key of the source document
    pub input_ref: String,
    /// Original file name of the source document
    pub input_filename: String,
    /// Size of the source document in bytes
    pub input_size: u64,
    /// Translation options
    pub options: TranslationOptions,
    /// Outputs (populated only once completed)
    pub output_files: Vec<OutputFile>,
    /// Error message (populated only once failed)
    pub error: Option<String>,
    /// Whether cancellation was requested
    pub cancel_requested: bool,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the task last changed
    pub updated_at: DateTime<Utc>,
    /// When processing started
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

/// A progress update for one task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProgressEvent {
    /// Task the event belongs to
    pub task_id: TaskId,
    /// Task status at the time of the event
    pub status: TaskStatus,
    /// Progress percentage
    pub progress: f32,
    /// Status message
    pub message: String,
    /// Engine stage, if reported
    pub stage: Option<String>,
    /// Event time
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Build the event describing a task snapshot
    pub fn from_task(task: &TaskInfo) -> Self {
        Self {
            task_id: task.id,
            status: task.status,
            progress: task.progress,
            message: task.message.clone(),
            stage: task.stage.clone(),
            timestamp: task.updated_at,
        }
    }

    /// Whether this is the final event of the task
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Role of a cache store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CacheRole {
    /// Uploaded source documents
    Upload,
    /// Produced output documents
    Result,
}

impl CacheRole {
    /// Lowercase role name
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheRole::Upload => "upload",
            CacheRole::Result => "result",
        }
    }
}

impl std::fmt::Display for CacheRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache usage statistics
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CacheStats {
    /// Store role
    pub role: CacheRole,
    /// Number of stored entries
    pub entry_count: usize,
    /// Sum of entry sizes
    pub total_size_bytes: u64,
    /// Configured capacity
    pub capacity_bytes: u64,
    /// Maximum entry age in seconds
    #[schema(value_type = u64)]
    #[serde(with = "crate::config::duration_serde")]
    pub max_age: Duration,
    /// Percentage of capacity in use
    pub usage_percent: f64,
    /// Directory holding the entries
    pub cache_dir: String,
}

/// Response for a stored upload
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadInfo {
    /// Upload cache key to reference in submissions
    pub file_id: String,
    /// Original file name
    pub filename: String,
    /// Size in bytes
    pub file_size: u64,
    /// Upload time
    pub uploaded_at: DateTime<Utc>,
    /// Earliest time the entry may be evicted by age
    pub expires_at: DateTime<Utc>,
}

/// Task counts per status plus admission state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskStats {
    /// Total tasks in the registry
    pub total: usize,
    /// Tasks waiting for admission
    pub pending: usize,
    /// Tasks currently running
    pub processing: usize,
    /// Completed tasks
    pub completed: usize,
    /// Failed tasks
    pub failed: usize,
    /// Cancelled tasks
    pub cancelled: usize,
    /// Current admission bound
    pub max_concurrent: usize,
}

fn default_lang_in() -> String {
    "en".to_string()
}

fn default_lang_out() -> String {
    "zh".to_string()
}

fn default_qps() -> u32 {
    4
}

fn default_min_text_length() -> u32 {
    5
}
