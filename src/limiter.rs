//! Admission control for task processing
//!
//! A FIFO queue of pending task ids and a running count share one mutex, so
//! admission and release are atomic with respect to each other and the bound holds
//! exactly. Lowering the bound never preempts running work; admissions simply
//! pause until enough tasks finish.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use utoipa::ToSchema;

use crate::error::{Error, Result};
use crate::types::TaskId;

#[derive(Debug)]
struct LimiterState {
    queue: VecDeque<TaskId>,
    running: usize,
    max_concurrent: usize,
}

/// Point-in-time view of the limiter
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct LimiterSnapshot {
    /// Tasks waiting, in admission order
    pub queued: Vec<TaskId>,
    /// Tasks currently holding a slot
    pub running: usize,
    /// Current bound
    pub max_concurrent: usize,
}

/// Bounded FIFO admission gate
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    state: Arc<Mutex<LimiterState>>,
}

impl ConcurrencyLimiter {
    /// Create a limiter admitting at most `max_concurrent` tasks at once
    pub fn new(max_concurrent: usize) -> Result<Self> {
        validate_bound(max_concurrent)?;
        Ok(Self {
            state: Arc::new(Mutex::new(LimiterState {
                queue: VecDeque::new(),
                running: 0,
                max_concurrent,
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a task to the back of the queue
    pub fn enqueue(&self, id: TaskId) {
        self.lock().queue.push_back(id);
    }

    /// Remove a queued task (cancelled or failed before admission)
    pub fn remove(&self, id: TaskId) -> bool {
        let mut state = self.lock();
        match state.queue.iter().position(|queued| *queued == id) {
            Some(pos) => {
                state.queue.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Pop queued tasks while slots are free
    ///
    /// Each returned id holds a slot until [`release`](Self::release) is called.
    /// `admit` runs under the limiter lock for every popped id and returns false to
    /// give the slot back (the task left `pending` by another path).
    pub fn try_admit<F>(&self, mut admit: F) -> Vec<TaskId>
    where
        F: FnMut(TaskId) -> bool,
    {
        let mut state = self.lock();
        let mut admitted = Vec::new();
        while state.running < state.max_concurrent {
            let Some(id) = state.queue.pop_front() else {
                break;
            };
            if admit(id) {
                state.running += 1;
                admitted.push(id);
            }
        }
        admitted
    }

    /// Give a slot back
    pub fn release(&self) {
        let mut state = self.lock();
        if state.running == 0 {
            tracing::warn!("limiter release without a matching admission");
            return;
        }
        state.running -= 1;
    }

    /// Change the bound; running tasks are never preempted
    pub fn set_max(&self, max_concurrent: usize) -> Result<()> {
        validate_bound(max_concurrent)?;
        let mut state = self.lock();
        let previous = state.max_concurrent;
        state.max_concurrent = max_concurrent;
        tracing::info!(previous, max_concurrent, running = state.running, "concurrency bound changed");
        Ok(())
    }

    /// Current bound
    pub fn max_concurrent(&self) -> usize {
        self.lock().max_concurrent
    }

    /// Tasks currently holding a slot
    pub fn running(&self) -> usize {
        self.lock().running
    }

    /// Current state
    pub fn snapshot(&self) -> LimiterSnapshot {
        let state = self.lock();
        LimiterSnapshot {
            queued: state.queue.iter().copied().collect(),
            running: state.running,
            max_concurrent: state.max_concurrent,
        }
    }
}

fn validate_bound(max_concurrent: usize) -> Result<()> {
    if max_concurrent == 0 {
        return Err(Error::InvalidInput(
            "max_concurrent must be at least 1".to_string(),
        ));
    }
    Ok(())
}
