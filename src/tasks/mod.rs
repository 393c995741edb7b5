//! Task registry split into focused submodules.
//!
//! The `TaskRegistry` struct and its methods are organized by domain:
//! - [`submit`] - Creating tasks from cached or inline uploads
//! - [`control`] - Queries, cancel, delete and output download
//! - [`runner`] - Admission and engine execution
//! - [`maintenance`] - Timeout, missing-input and retention passes used by the janitor
//! - [`lifecycle`] - Runtime bound changes and shutdown

mod control;
mod lifecycle;
mod maintenance;
mod record;
mod runner;
mod submit;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use control::{MAX_PAGE_SIZE, TaskPage};
pub use maintenance::ReapedInput;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::engine::{TranslationEngine, engine_from_config};
use crate::error::{Result, TaskError};
use crate::limiter::ConcurrencyLimiter;
use crate::progress::ProgressHub;
use crate::types::{CacheRole, TaskId};
use record::TaskRecord;

type TaskMap = HashMap<TaskId, Arc<Mutex<TaskRecord>>>;

/// Execution bookkeeping shared by all clones of the registry
#[derive(Clone)]
pub(crate) struct RunState {
    /// Whether new submissions are accepted (false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Engine runs currently in flight
    pub(crate) active_runs: Arc<AtomicUsize>,
    /// Next insertion sequence number
    pub(crate) next_seq: Arc<AtomicU64>,
    /// Cancelled once shutdown begins
    pub(crate) stopping: CancellationToken,
}

/// Owner of every translation task and its state machine
///
/// Tasks move `pending -> processing -> completed | failed | cancelled`, with
/// `pending -> cancelled` for cancellations before admission. The registry admits
/// pending tasks through the [`ConcurrencyLimiter`], runs each admitted task on its
/// own tokio task, and publishes every state change to the [`ProgressHub`].
///
/// Cloning is cheap; all clones share state.
///
/// Lock order when more than one is held: limiter, then task map, then a task's
/// record, then the hub.
#[derive(Clone)]
pub struct TaskRegistry {
    pub(crate) tasks: Arc<RwLock<TaskMap>>,
    pub(crate) limiter: ConcurrencyLimiter,
    pub(crate) hub: ProgressHub,
    pub(crate) uploads: CacheStore,
    pub(crate) results: CacheStore,
    pub(crate) engine: Arc<dyn TranslationEngine>,
    pub(crate) config: Arc<Config>,
    pub(crate) run_state: RunState,
}

impl TaskRegistry {
    /// Assemble a registry from already opened parts
    pub fn new(
        config: Arc<Config>,
        uploads: CacheStore,
        results: CacheStore,
        hub: ProgressHub,
        engine: Arc<dyn TranslationEngine>,
    ) -> Result<Self> {
        config.validate()?;
        let limiter = ConcurrencyLimiter::new(config.tasks.max_concurrent_tasks)?;

        tracing::info!(
            engine = engine.name(),
            max_concurrent = config.tasks.max_concurrent_tasks,
            "task registry ready"
        );

        Ok(Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            limiter,
            hub,
            uploads,
            results,
            engine,
            config,
            run_state: RunState {
                accepting_new: Arc::new(AtomicBool::new(true)),
                active_runs: Arc::new(AtomicUsize::new(0)),
                next_seq: Arc::new(AtomicU64::new(0)),
                stopping: CancellationToken::new(),
            },
        })
    }

    /// Open both caches from `config`, pick the engine, and build the registry
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let uploads = CacheStore::open(
            CacheRole::Upload,
            config.cache.upload_dir(),
            config.cache.upload,
            Some(config.tasks.max_file_size),
        )
        .await?;
        let results = CacheStore::open(
            CacheRole::Result,
            config.cache.result_dir(),
            config.cache.result,
            None,
        )
        .await?;

        // Scratch space from a previous run is never resumed
        let work_dir = config.cache.work_dir();
        if tokio::fs::try_exists(&work_dir).await.unwrap_or(false)
            && let Err(e) = tokio::fs::remove_dir_all(&work_dir).await
        {
            tracing::warn!(dir = %work_dir.display(), error = %e, "failed to clear stale work directory");
        }
        tokio::fs::create_dir_all(&work_dir).await?;

        let engine = engine_from_config(&config.engine);
        Self::new(config, uploads, results, ProgressHub::default(), engine)
    }

    /// The upload cache
    pub fn uploads(&self) -> &CacheStore {
        &self.uploads
    }

    /// The result cache
    pub fn results(&self) -> &CacheStore {
        &self.results
    }

    /// The progress hub
    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }

    /// Active configuration
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// The engine tasks are executed with
    pub fn engine(&self) -> &Arc<dyn TranslationEngine> {
        &self.engine
    }

    /// Whether submissions are accepted
    pub fn is_accepting(&self) -> bool {
        self.run_state.accepting_new.load(Ordering::SeqCst)
    }

    /// Token cancelled when [`shutdown`](Self::shutdown) begins
    pub fn stopping(&self) -> CancellationToken {
        self.run_state.stopping.clone()
    }

    pub(crate) fn map(&self) -> std::sync::RwLockReadGuard<'_, TaskMap> {
        self.tasks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn map_mut(&self) -> std::sync::RwLockWriteGuard<'_, TaskMap> {
        self.tasks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn record(&self, id: TaskId) -> Result<Arc<Mutex<TaskRecord>>> {
        self.map()
            .get(&id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound { id }.into())
    }

    /// All records, in no particular order
    pub(crate) fn records(&self) -> Vec<Arc<Mutex<TaskRecord>>> {
        self.map().values().cloned().collect()
    }
}

pub(crate) fn lock(record: &Mutex<TaskRecord>) -> MutexGuard<'_, TaskRecord> {
    record
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
