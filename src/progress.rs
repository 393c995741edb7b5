//! Per-task progress fan-out
//!
//! Every task gets a broadcast channel plus the last event published on it. A new
//! subscriber first receives that snapshot and then live events until the task's
//! terminal event, after which its subscription ends. Subscribing and publishing take
//! the same lock, so a subscriber never misses an event published between its
//! snapshot and its first live receive.
//!
//! Slow subscribers do not hold up publishers: the per-channel buffer is bounded and a
//! receiver that falls behind skips ahead to the newest events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::Stream;
use tokio::sync::broadcast;

use crate::types::{ProgressEvent, TaskId};

/// Default number of buffered events per task channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

struct Channel {
    tx: broadcast::Sender<ProgressEvent>,
    last: ProgressEvent,
    terminal_at: Option<Instant>,
}

struct HubInner {
    channels: Mutex<HashMap<TaskId, Channel>>,
    all_tx: broadcast::Sender<ProgressEvent>,
    capacity: usize,
}

/// Publish/subscribe hub for task progress events
#[derive(Clone)]
pub struct ProgressHub {
    inner: Arc<HubInner>,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ProgressHub {
    /// Create a hub buffering up to `capacity` events per channel
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (all_tx, _) = broadcast::channel(capacity * 16);
        Self {
            inner: Arc::new(HubInner {
                channels: Mutex::new(HashMap::new()),
                all_tx,
                capacity,
            }),
        }
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<TaskId, Channel>> {
        // Nothing inside the lock can panic halfway through an update
        self.inner
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fan an event out to the task's subscribers and the global stream
    ///
    /// Returns false when the task already published its terminal event, in which
    /// case the event is dropped.
    pub fn publish(&self, event: ProgressEvent) -> bool {
        let mut channels = self.channels();
        let channel = channels.entry(event.task_id).or_insert_with(|| Channel {
            tx: broadcast::channel(self.inner.capacity).0,
            last: event.clone(),
            terminal_at: None,
        });

        if channel.terminal_at.is_some() {
            tracing::trace!(task_id = %event.task_id, "dropping event published after terminal");
            return false;
        }

        channel.last = event.clone();
        if event.is_terminal() {
            channel.terminal_at = Some(Instant::now());
        }

        // send() fails only when nobody is listening
        channel.tx.send(event.clone()).ok();
        self.inner.all_tx.send(event).ok();
        true
    }

    /// Subscribe to one task
    ///
    /// The first event delivered is the last one published for the task, or
    /// `fallback` (the registry's view of the task) when the hub has none.
    pub fn subscribe(&self, task_id: TaskId, fallback: ProgressEvent) -> Subscription {
        let mut channels = self.channels();

        match channels.get(&task_id) {
            Some(channel) if channel.terminal_at.is_some() => {
                Subscription::one_shot(channel.last.clone())
            }
            Some(channel) => Subscription {
                pending: Some(channel.last.clone()),
                rx: Some(channel.tx.subscribe()),
            },
            None if fallback.is_terminal() => Subscription::one_shot(fallback),
            None => {
                let (tx, rx) = broadcast::channel(self.inner.capacity);
                channels.insert(
                    task_id,
                    Channel {
                        tx,
                        last: fallback.clone(),
                        terminal_at: None,
                    },
                );
                Subscription {
                    pending: Some(fallback),
                    rx: Some(rx),
                }
            }
        }
    }

    /// Receive every event published for any task
    pub fn subscribe_all(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.all_tx.subscribe()
    }

    /// Last event published for a task
    pub fn last(&self, task_id: TaskId) -> Option<ProgressEvent> {
        self.channels().get(&task_id).map(|c| c.last.clone())
    }

    /// Drop a task's channel, ending its subscriptions
    pub fn remove(&self, task_id: TaskId) -> bool {
        self.channels().remove(&task_id).is_some()
    }

    /// Drop channels whose terminal event is older than `grace`
    pub fn prune(&self, grace: Duration) -> usize {
        let mut channels = self.channels();
        let before = channels.len();
        channels.retain(|_, channel| match channel.terminal_at {
            Some(at) => at.elapsed() < grace,
            None => true,
        });
        before - channels.len()
    }

    /// Number of tracked channels
    pub fn channel_count(&self) -> usize {
        self.channels().len()
    }
}

/// A single subscriber's view of one task's events
pub struct Subscription {
    pending: Option<ProgressEvent>,
    rx: Option<broadcast::Receiver<ProgressEvent>>,
}

impl Subscription {
    fn one_shot(event: ProgressEvent) -> Self {
        Self {
            pending: Some(event),
            rx: None,
        }
    }

    /// Next event, or None once the terminal event was delivered or the channel was removed
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        if let Some(event) = self.pending.take() {
            if event.is_terminal() {
                self.rx = None;
            }
            return Some(event);
        }

        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.is_terminal() {
                        self.rx = None;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "progress subscriber lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Turn the subscription into a stream that ends after the terminal event
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}
