//! CLI-based engine driving an external translator binary

use super::parser::{StatusLine, parse_status_line};
use super::traits::{EngineContext, TranslationEngine, TranslationJob};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::types::{OutputMode, WatermarkMode};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

const STDERR_TAIL_LINES: usize = 20;

/// Engine that runs the translator as a child process
///
/// The translator is invoked once per task with the task's options as command
/// line flags. It reports progress as JSON status lines on stdout (see
/// [`parse_status_line`]) and writes its outputs into the job's output directory.
/// Cancellation kills the child process.
///
/// # Examples
///
/// ```no_run
/// use doctrans::engine::{CliEngine, TranslationEngine};
/// use std::path::PathBuf;
///
/// // Explicit path
/// let engine = CliEngine::new(PathBuf::from("/usr/local/bin/babeldoc"));
///
/// // Or auto-discover from PATH
/// let engine = CliEngine::from_path("babeldoc");
/// ```
#[derive(Debug, Clone)]
pub struct CliEngine {
    binary_path: PathBuf,
    extra_args: Vec<String>,
}

impl CliEngine {
    /// Create an engine with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            extra_args: Vec::new(),
        }
    }

    /// Look up `binary_name` on PATH
    pub fn from_path(binary_name: &str) -> Option<Self> {
        which::which(binary_name).ok().map(Self::new)
    }

    /// Build from configuration: explicit path first, then PATH search if enabled
    pub fn from_config(config: &EngineConfig) -> Option<Self> {
        let engine = match &config.command {
            Some(path) => Some(Self::new(path.clone())),
            None if config.search_path => Self::from_path(&config.binary_name),
            None => None,
        }?;
        Some(engine.with_extra_args(config.extra_args.clone()))
    }

    /// Arguments placed before the per-task flags
    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    /// Path of the translator binary
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Command line for one job
    pub fn build_args(&self, job: &TranslationJob) -> Vec<OsString> {
        let options = &job.options;
        let mut args: Vec<OsString> = self.extra_args.iter().map(OsString::from).collect();

        args.push("--files".into());
        args.push(job.input_path.clone().into_os_string());
        args.push("--lang-in".into());
        args.push(options.lang_in.clone().into());
        args.push("--lang-out".into());
        args.push(options.lang_out.clone().into());
        args.push("--output".into());
        args.push(job.output_dir.clone().into_os_string());
        args.push("--working-dir".into());
        args.push(job.work_dir.clone().into_os_string());
        args.push("--qps".into());
        args.push(options.qps.to_string().into());
        args.push("--min-text-length".into());
        args.push(options.min_text_length.to_string().into());

        if let Some(pages) = &options.pages {
            args.push("--pages".into());
            args.push(pages.clone().into());
        }

        match options.output_mode {
            OutputMode::Mono => args.push("--no-dual".into()),
            OutputMode::Dual => args.push("--no-mono".into()),
            OutputMode::Both => {}
        }

        args.push("--watermark-output-mode".into());
        args.push(
            match options.watermark {
                WatermarkMode::Watermarked => "watermarked",
                WatermarkMode::NoWatermark => "no_watermark",
                WatermarkMode::Both => "both",
            }
            .into(),
        );

        if let Some(prompt) = &options.custom_prompt {
            args.push("--custom-system-prompt".into());
            args.push(prompt.clone().into());
        }
        if options.auto_extract_glossary {
            args.push("--auto-extract-glossary".into());
        }
        if options.ignore_cache {
            args.push("--ignore-cache".into());
        }

        args
    }
}

#[async_trait]
impl TranslationEngine for CliEngine {
    async fn translate(&self, job: TranslationJob, ctx: EngineContext) -> Result<Vec<PathBuf>> {
        ctx.checkpoint()?;

        let mut child = Command::new(&self.binary_path)
            .args(self.build_args(&job))
            .current_dir(&job.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("failed to execute translator: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ExternalTool("translator stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ExternalTool("translator stderr not captured".into()))?;

        let task_id = job.task_id;
        let stderr_tail = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).split(b'\n');
            while let Ok(Some(raw)) = lines.next_segment().await {
                let line = decode_line(raw);
                tracing::trace!(task_id = %task_id, line = %line, "translator stderr");
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let mut lines = BufReader::new(stdout).split(b'\n');
        let mut reported_error = None;
        loop {
            let line = tokio::select! {
                _ = ctx.cancelled() => {
                    tracing::info!(task_id = %task_id, "cancelling translator process");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(task_id = %task_id, error = %e, "failed to kill translator");
                    }
                    return Err(Error::Cancelled);
                }
                segment = lines.next_segment() => segment?,
            };

            let Some(line) = line.map(decode_line) else { break };
            match parse_status_line(&line) {
                Some(StatusLine::Progress {
                    overall_progress,
                    stage,
                    message,
                }) => ctx.report(
                    overall_progress,
                    stage.as_deref(),
                    message.unwrap_or_default(),
                ),
                Some(StatusLine::Finish) => {
                    tracing::debug!(task_id = %task_id, "translator reported finish");
                }
                Some(StatusLine::Error(e)) => reported_error = Some(e),
                None => tracing::trace!(task_id = %task_id, line = %line, "translator stdout"),
            }
        }

        let status = tokio::select! {
            _ = ctx.cancelled() => {
                child.kill().await.ok();
                return Err(Error::Cancelled);
            }
            status = child.wait() => status?,
        };
        let stderr_tail = stderr_tail.await.unwrap_or_default();

        if let Some(e) = reported_error {
            return Err(Error::ExternalTool(e));
        }
        if !status.success() {
            return Err(Error::ExternalTool(format!(
                "translator exited with {}: {}",
                status,
                stderr_tail.trim()
            )));
        }

        let outputs = collect_outputs(&job.output_dir).await?;
        if outputs.is_empty() {
            return Err(Error::EngineFailure(
                "translator produced no output files".to_string(),
            ));
        }
        Ok(outputs)
    }

    fn name(&self) -> &'static str {
        "cli-translator"
    }
}

/// Translators may log in any encoding; undecodable bytes become U+FFFD
fn decode_line(raw: Vec<u8>) -> String {
    let mut line = match String::from_utf8(raw) {
        Ok(line) => line,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    if line.ends_with('\r') {
        line.pop();
    }
    line
}

/// Regular files in `dir`, sorted by name
pub(crate) async fn collect_outputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut outputs = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            outputs.push(entry.path());
        }
    }
    outputs.sort();
    Ok(outputs)
}
