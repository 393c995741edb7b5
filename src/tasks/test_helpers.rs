//! Shared test helpers: a controllable engine and registry construction.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio::sync::Semaphore;

use crate::cache::CacheStore;
use crate::config::{CacheLimits, Config};
use crate::engine::{EngineContext, TranslationEngine, TranslationJob};
use crate::error::{Error, Result};
use crate::progress::ProgressHub;
use crate::tasks::TaskRegistry;
use crate::types::{CacheRole, TaskId, TaskInfo, TaskStatus, TranslationOptions};

/// Minimal PDF-looking payload
pub(crate) const SAMPLE_PDF: &[u8] = b"%PDF-1.7\n1 0 obj << >> endobj\ntrailer << >>\n%%EOF\n";

/// What the stub engine does once its gate opens
#[derive(Clone, Debug)]
pub(crate) enum StubOutcome {
    /// Write one file per name into the output directory
    Succeed(Vec<&'static str>),
    /// Return an engine failure with this message
    Fail(&'static str),
    /// Panic inside the engine
    Panic,
    /// Return success without producing files
    Empty,
}

/// Engine whose runs block until the test releases them
///
/// Each run records its task id, reports 50% progress, then waits for a gate
/// permit. Unless `ignore_cancel` is set, cancellation ends the wait with
/// `Error::Cancelled`.
pub(crate) struct StubEngine {
    gate: Semaphore,
    outcome: Mutex<StubOutcome>,
    ignore_cancel: bool,
    started: Mutex<Vec<TaskId>>,
    finished: AtomicUsize,
}

impl StubEngine {
    /// Gated engine producing a mono and a dual output
    pub(crate) fn gated() -> Arc<Self> {
        Self::with_outcome(StubOutcome::Succeed(vec!["doc.mono.pdf", "doc.dual.pdf"]), false)
    }

    /// Engine that never blocks
    pub(crate) fn instant(outcome: StubOutcome) -> Arc<Self> {
        let engine = Self::with_outcome(outcome, false);
        engine.release(Semaphore::MAX_PERMITS / 2);
        engine
    }

    /// Gated engine that keeps waiting for its permit after cancellation
    pub(crate) fn stubborn() -> Arc<Self> {
        Self::with_outcome(StubOutcome::Succeed(vec!["doc.mono.pdf"]), true)
    }

    pub(crate) fn with_outcome(outcome: StubOutcome, ignore_cancel: bool) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            outcome: Mutex::new(outcome),
            ignore_cancel,
            started: Mutex::new(Vec::new()),
            finished: AtomicUsize::new(0),
        })
    }

    /// Let `n` blocked runs (present or future) proceed
    pub(crate) fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub(crate) fn set_outcome(&self, outcome: StubOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    /// Task ids in the order their runs started
    pub(crate) fn started(&self) -> Vec<TaskId> {
        self.started.lock().unwrap().clone()
    }

    pub(crate) fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` runs have started
    pub(crate) async fn wait_started(&self, n: usize) {
        wait_until(|| self.started().len() >= n).await;
    }
}

#[async_trait]
impl TranslationEngine for StubEngine {
    async fn translate(&self, job: TranslationJob, ctx: EngineContext) -> Result<Vec<PathBuf>> {
        self.started.lock().unwrap().push(job.task_id);
        ctx.report(50.0, Some("translate"), "halfway");

        if self.ignore_cancel {
            self.gate.acquire().await.unwrap().forget();
        } else {
            tokio::select! {
                _ = ctx.cancelled() => {
                    self.finished.fetch_add(1, Ordering::SeqCst);
                    return Err(Error::Cancelled);
                }
                permit = self.gate.acquire() => permit.unwrap().forget(),
            }
        }

        let outcome = self.outcome.lock().unwrap().clone();
        self.finished.fetch_add(1, Ordering::SeqCst);
        match outcome {
            StubOutcome::Succeed(names) => {
                let mut produced = Vec::new();
                for name in names {
                    let path = job.output_dir.join(name);
                    let body = format!("{} translated from {}", name, job.input_filename);
                    tokio::fs::write(&path, body).await?;
                    produced.push(path);
                }
                Ok(produced)
            }
            StubOutcome::Fail(message) => Err(Error::EngineFailure(message.to_string())),
            StubOutcome::Panic => panic!("stub engine exploded"),
            StubOutcome::Empty => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Engine finishing after a delay derived from the task id, recording overlap
pub(crate) struct JitterEngine {
    max_delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl JitterEngine {
    pub(crate) fn new(max_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            max_delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Most runs ever in flight at once
    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationEngine for JitterEngine {
    async fn translate(&self, job: TranslationJob, ctx: EngineContext) -> Result<Vec<PathBuf>> {
        let now_running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_running, Ordering::SeqCst);

        let seed = job
            .task_id
            .to_string()
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
        ctx.report(50.0, Some("translate"), "halfway");
        tokio::time::sleep(self.max_delay.mul_f64((seed % 100) as f64 / 100.0)).await;

        let path = job.output_dir.join("doc.mono.pdf");
        let written = tokio::fs::write(&path, job.input_filename.as_bytes()).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        written?;
        Ok(vec![path])
    }

    fn name(&self) -> &'static str {
        "jitter"
    }
}

/// Test configuration rooted in `dir`: 3 slots, 1 MB uploads, 10 MB caches
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.cache.cache_dir = dir.join("cache");
    config.cache.upload = CacheLimits {
        capacity_bytes: 10 * 1024 * 1024,
        max_age: Duration::from_secs(3600),
    };
    config.cache.result = CacheLimits {
        capacity_bytes: 10 * 1024 * 1024,
        max_age: Duration::from_secs(3600),
    };
    config.tasks.max_concurrent_tasks = 3;
    config.tasks.max_file_size = 1024 * 1024;
    config.tasks.shutdown_grace = Duration::from_millis(500);
    config
}

/// Helper to create a test registry with the given engine.
/// Returns the registry and the tempdir (which must be kept alive).
pub(crate) async fn create_test_registry(
    engine: Arc<dyn TranslationEngine>,
) -> (TaskRegistry, TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());
    let registry = registry_from_config(config, engine).await;
    (registry, temp_dir)
}

pub(crate) async fn registry_from_config(
    config: Config,
    engine: Arc<dyn TranslationEngine>,
) -> TaskRegistry {
    let uploads = CacheStore::open(
        CacheRole::Upload,
        config.cache.upload_dir(),
        config.cache.upload,
        Some(config.tasks.max_file_size),
    )
    .await
    .unwrap();
    let results = CacheStore::open(
        CacheRole::Result,
        config.cache.result_dir(),
        config.cache.result,
        None,
    )
    .await
    .unwrap();
    std::fs::create_dir_all(config.cache.work_dir()).unwrap();

    TaskRegistry::new(
        Arc::new(config),
        uploads,
        results,
        ProgressHub::default(),
        engine,
    )
    .unwrap()
}

/// Upload a distinct document and submit it with default options
pub(crate) async fn submit_sample(registry: &TaskRegistry, n: usize) -> TaskId {
    let mut content = SAMPLE_PDF.to_vec();
    content.extend_from_slice(format!("% sample {}\n", n).as_bytes());
    registry
        .submit_upload(&content, &format!("sample-{}.pdf", n), TranslationOptions::default())
        .await
        .unwrap()
}

/// Poll `condition` every 10ms, panicking after 5 seconds
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait for a task to reach `status` and return its snapshot
pub(crate) async fn wait_for_status(
    registry: &TaskRegistry,
    id: TaskId,
    status: TaskStatus,
) -> TaskInfo {
    wait_until(|| registry.get(id).map(|t| t.status == status).unwrap_or(false)).await;
    registry.get(id).unwrap()
}

/// Wait until no engine run is in flight
pub(crate) async fn wait_idle(registry: &TaskRegistry) {
    wait_until(|| registry.run_state.active_runs.load(Ordering::SeqCst) == 0).await;
}
