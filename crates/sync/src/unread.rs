//! Unread-message tracking over a persisted counter.
//!
//! The counter is written by the chat surface, out of process, so there is
//! no event hook: the tracker polls it on a fixed interval and derives
//! rising edges by comparing against the last value it saw.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::instrument;

use crate::clients::CounterStore;
use crate::error::CounterError;
use crate::notify::NotificationDispatcher;

/// A rise in the unread counter between two polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// How many messages arrived since the previous poll.
    pub delta: u64,
    /// Counter value that produced this event.
    pub total: u64,
    pub detected_at: DateTime<Utc>,
}

impl NewMessage {
    #[must_use]
    pub fn new(delta: u64, total: u64) -> Self {
        Self {
            delta,
            total,
            detected_at: Utc::now(),
        }
    }
}

/// Rising-edge detector for the unread counter.
///
/// The first observation after start only sets the baseline: a nonzero
/// counter left over from a previous session is adopted silently instead of
/// being announced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnreadState {
    last_seen: Option<u64>,
}

impl UnreadState {
    #[must_use]
    pub const fn new() -> Self {
        Self { last_seen: None }
    }

    /// State for a session that already observed `last_seen`.
    #[must_use]
    pub const fn resumed(last_seen: u64) -> Self {
        Self {
            last_seen: Some(last_seen),
        }
    }

    /// Last observed value, `None` before the first observation.
    #[must_use]
    pub const fn last_seen(&self) -> Option<u64> {
        self.last_seen
    }

    /// Compare `current` against the last observation, then adopt it.
    ///
    /// Returns an event only for a rise over an established baseline. A drop
    /// (external reset) is followed silently.
    pub fn observe(&mut self, current: u64) -> Option<NewMessage> {
        let event = self
            .last_seen
            .filter(|&last| current > last)
            .map(|last| NewMessage::new(current - last, current));
        self.last_seen = Some(current);
        event
    }

    /// Forget the baseline; the next observation is a first observation.
    pub fn reset(&mut self) {
        self.last_seen = None;
    }

    /// Adopt `0` as the baseline after the counter was cleared locally.
    pub fn mark_read(&mut self) {
        self.last_seen = Some(0);
    }
}

/// Polls the persisted unread counter and feeds rises to a
/// [`NotificationDispatcher`].
///
/// Cheaply cloneable; clones control the same poll loop.
#[derive(Clone)]
pub struct LocalUnreadTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    counter: Arc<dyn CounterStore>,
    key: String,
    interval: Duration,
    state: Mutex<TrackerState>,
    badge_tx: watch::Sender<u64>,
}

#[derive(Default)]
struct TrackerState {
    unread: UnreadState,
    epoch: u64,
    /// Bumped by `mark_read`; a read that started before the bump is stale.
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// Result of one poll.
enum Poll {
    /// The tracker was stopped or restarted while the read was in flight.
    Stale,
    Quiet,
    Rise(NewMessage),
}

impl LocalUnreadTracker {
    #[must_use]
    pub fn new(counter: Arc<dyn CounterStore>, key: impl Into<String>, interval: Duration) -> Self {
        let (badge_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(TrackerInner {
                counter,
                key: key.into(),
                interval,
                state: Mutex::new(TrackerState::default()),
                badge_tx,
            }),
        }
    }

    /// Start polling. The first poll runs immediately, then once per interval.
    ///
    /// A running loop is replaced and the detector starts fresh, so the first
    /// read after `start` never produces an event. Must be called from within
    /// a Tokio runtime.
    ///
    /// Each delivery runs as its own task: a [`stop`](Self::stop) that lands
    /// after the vibration still lets the notification through.
    pub fn start(&self, dispatcher: NotificationDispatcher) {
        let mut state = self.inner.lock();
        self.inner.teardown(&mut state);
        let epoch = state.epoch;

        let inner = Arc::clone(&self.inner);
        state.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match inner.poll(epoch).await {
                    Poll::Stale => return,
                    Poll::Quiet => {}
                    Poll::Rise(event) => {
                        let dispatcher = dispatcher.clone();
                        let delivery =
                            tokio::spawn(async move { dispatcher.dispatch(&event).await });
                        if let Err(e) = delivery.await {
                            tracing::warn!(error = %e, "Notification delivery task failed");
                        }
                    }
                }
            }
        }));
        tracing::info!(
            key = %self.inner.key,
            interval_ms = self.inner.interval.as_millis(),
            "Unread tracker started"
        );
    }

    /// Run a single poll outside the loop. Does not dispatch.
    pub async fn poll_once(&self) -> Option<NewMessage> {
        let epoch = self.inner.lock().epoch;
        match self.inner.poll(epoch).await {
            Poll::Rise(event) => Some(event),
            Poll::Stale | Poll::Quiet => None,
        }
    }

    /// Stop polling and reset the badge to `0`. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        self.inner.teardown(&mut state);
    }

    /// Mark every message read: persist `0` and forget the last observation.
    ///
    /// A poll whose read was in flight when the counter was cleared is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns `CounterError` if the counter cannot be written; local state is
    /// left unchanged in that case.
    #[instrument(skip(self), fields(key = %self.inner.key))]
    pub async fn mark_read(&self) -> Result<(), CounterError> {
        self.inner.counter.set(&self.inner.key, "0").await?;
        let mut state = self.inner.lock();
        state.generation = state.generation.wrapping_add(1);
        state.unread.mark_read();
        self.inner.publish_badge(0);
        Ok(())
    }

    /// Receiver for the unread badge.
    #[must_use]
    pub fn badge(&self) -> watch::Receiver<u64> {
        self.inner.badge_tx.subscribe()
    }

    #[must_use]
    pub fn current_badge(&self) -> u64 {
        *self.inner.badge_tx.borrow()
    }

    #[must_use]
    pub fn last_seen(&self) -> Option<u64> {
        self.inner.lock().unread.last_seen()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.lock().task.is_some()
    }
}

impl TrackerInner {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn teardown(&self, state: &mut TrackerState) {
        state.epoch = state.epoch.wrapping_add(1);
        if let Some(task) = state.task.take() {
            task.abort();
            tracing::info!(key = %self.key, "Unread tracker stopped");
        }
        state.unread.reset();
        self.publish_badge(0);
    }

    async fn read_counter(&self) -> Result<u64, CounterError> {
        match self.counter.get(&self.key).await? {
            None => Ok(0),
            Some(raw) => raw.trim().parse().map_err(|_| CounterError::InvalidValue {
                key: self.key.clone(),
                value: raw,
            }),
        }
    }

    /// Read the counter, then compare under the lock. The counter may move
    /// between the two; the comparison uses whatever was read.
    async fn poll(&self, epoch: u64) -> Poll {
        let generation = self.lock().generation;
        let read = self.read_counter().await;

        let mut state = self.lock();
        if state.epoch != epoch {
            return Poll::Stale;
        }
        if state.generation != generation {
            tracing::debug!(key = %self.key, "Discarding read taken before mark_read");
            return Poll::Quiet;
        }
        let current = match read {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!(error = %e, key = %self.key, "Unread counter read failed");
                return Poll::Quiet;
            }
        };

        let event = state.unread.observe(current);
        self.publish_badge(current);
        match event {
            Some(event) => {
                tracing::debug!(delta = event.delta, total = event.total, "New message detected");
                Poll::Rise(event)
            }
            None => Poll::Quiet,
        }
    }

    fn publish_badge(&self, value: u64) {
        self.badge_tx.send_if_modified(|badge| {
            if *badge == value {
                false
            } else {
                *badge = value;
                true
            }
        });
    }
}
