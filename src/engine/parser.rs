//! Parser for the translator's line-oriented status output
//!
//! The translator prints one JSON object per line on stdout while it runs:
//!
//! ```text
//! {"type":"progress_update","overall_progress":42.5,"stage":"Translate Paragraphs","message":"12/40"}
//! {"type":"finish"}
//! {"type":"error","error":"model quota exceeded"}
//! ```
//!
//! Anything that is not such an object is ordinary log output and is ignored.

use serde::Deserialize;

/// A status line emitted by the translator
#[derive(Debug, Clone, PartialEq)]
pub enum StatusLine {
    /// Progress report, `overall_progress` in [0, 100]
    Progress {
        /// Overall progress
        overall_progress: f32,
        /// Stage name
        stage: Option<String>,
        /// Detail message
        message: Option<String>,
    },
    /// Translation finished successfully
    Finish,
    /// Translation failed
    Error(String),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawLine {
    ProgressUpdate {
        overall_progress: f32,
        #[serde(default)]
        stage: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    Finish,
    Error {
        #[serde(default)]
        error: Option<String>,
    },
}

/// Parse one stdout line, returning None for non-status output
pub fn parse_status_line(line: &str) -> Option<StatusLine> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }

    match serde_json::from_str::<RawLine>(line).ok()? {
        RawLine::ProgressUpdate {
            overall_progress,
            stage,
            message,
        } => Some(StatusLine::Progress {
            overall_progress: overall_progress.clamp(0.0, 100.0),
            stage: stage.filter(|s| !s.is_empty()),
            message: message.filter(|m| !m.is_empty()),
        }),
        RawLine::Finish => Some(StatusLine::Finish),
        RawLine::Error { error } => Some(StatusLine::Error(
            error.unwrap_or_else(|| "unknown error".to_string()),
        )),
    }
}
