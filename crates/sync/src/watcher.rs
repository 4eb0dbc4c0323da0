//! Live account-profile and order-count subscriptions for one identity.
//!
//! # Teardown
//!
//! Every `start` and `stop` bumps an epoch under the watcher lock before
//! touching published values. Listener tasks publish only while holding that
//! lock and only if their epoch is still current, so a snapshot that was in
//! flight when the identity changed can never overwrite the reset values or
//! the next identity's data.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use giftshop_core::{AccountDocument, AccountProfile, OrderRecord, UserId};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clients::{RemoteStore, RemoteStream};
use crate::config::SyncConfig;
use crate::error::RemoteError;
use crate::sink::ErrorSink;

/// Watches the remote store on behalf of the current identity.
///
/// Cheaply cloneable; clones control the same subscriptions.
#[derive(Clone)]
pub struct RemoteStateWatcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    remote: Arc<dyn RemoteStore>,
    errors: Arc<dyn ErrorSink>,
    accounts_collection: String,
    orders_collection: String,
    order_owner_field: String,
    state: Mutex<WatchState>,
    profile_tx: watch::Sender<Option<AccountProfile>>,
    order_count_tx: watch::Sender<usize>,
}

#[derive(Default)]
struct WatchState {
    epoch: u64,
    active: Option<ActiveWatch>,
}

struct ActiveWatch {
    identity: UserId,
    tasks: Vec<JoinHandle<()>>,
}

impl RemoteStateWatcher {
    /// Create an idle watcher.
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        errors: Arc<dyn ErrorSink>,
        config: &SyncConfig,
    ) -> Self {
        let (profile_tx, _) = watch::channel(None);
        let (order_count_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(WatcherInner {
                remote,
                errors,
                accounts_collection: config.accounts_collection.clone(),
                orders_collection: config.orders_collection.clone(),
                order_owner_field: config.order_owner_field.clone(),
                state: Mutex::new(WatchState::default()),
                profile_tx,
                order_count_tx,
            }),
        }
    }

    /// Subscribe to `identity`'s profile document and orders.
    ///
    /// Any previous subscriptions are torn down first and the published
    /// values reset, so the order count reads `0` until the new identity's
    /// first snapshot arrives. Starting the identity that is already being
    /// watched is a no-op. A listener that fails to open is reported to the
    /// error sink; the other listener still starts.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, identity: &UserId) {
        let mut state = self.inner.lock();
        if state
            .active
            .as_ref()
            .is_some_and(|active| &active.identity == identity)
        {
            return;
        }
        self.inner.teardown(&mut state);
        let epoch = state.epoch;

        let mut tasks = Vec::with_capacity(2);

        match self
            .inner
            .remote
            .subscribe_document(&self.inner.accounts_collection, identity)
        {
            Ok(stream) => tasks.push(tokio::spawn(run_listener(
                Arc::clone(&self.inner),
                epoch,
                stream,
                publish_profile,
            ))),
            Err(e) => self.inner.errors.report(&e),
        }

        match self.inner.remote.subscribe_owned(
            &self.inner.orders_collection,
            &self.inner.order_owner_field,
            identity,
        ) {
            Ok(stream) => {
                let owner = identity.clone();
                tasks.push(tokio::spawn(run_listener(
                    Arc::clone(&self.inner),
                    epoch,
                    stream,
                    move |inner: &WatcherInner, records: Vec<OrderRecord>| {
                        publish_order_count(inner, &owner, &records);
                    },
                )));
            }
            Err(e) => self.inner.errors.report(&e),
        }

        tracing::info!(user_id = %identity, listeners = tasks.len(), "Remote watch started");
        state.active = Some(ActiveWatch {
            identity: identity.clone(),
            tasks,
        });
    }

    /// Cancel all subscriptions and reset published values (`None` profile,
    /// `0` orders). Safe to call any number of times.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        self.inner.teardown(&mut state);
    }

    /// Identity currently being watched.
    #[must_use]
    pub fn identity(&self) -> Option<UserId> {
        self.inner
            .lock()
            .active
            .as_ref()
            .map(|active| active.identity.clone())
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.lock().active.is_some()
    }

    /// Receiver for the header avatar and name.
    #[must_use]
    pub fn profile(&self) -> watch::Receiver<Option<AccountProfile>> {
        self.inner.profile_tx.subscribe()
    }

    /// Receiver for the order badge.
    #[must_use]
    pub fn order_count(&self) -> watch::Receiver<usize> {
        self.inner.order_count_tx.subscribe()
    }

    #[must_use]
    pub fn current_profile(&self) -> Option<AccountProfile> {
        self.inner.profile_tx.borrow().clone()
    }

    #[must_use]
    pub fn current_order_count(&self) -> usize {
        *self.inner.order_count_tx.borrow()
    }
}

impl WatcherInner {
    fn lock(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one listener item under the lock. Returns `false` once `epoch`
    /// has been superseded.
    fn publish_if_current<T>(
        &self,
        epoch: u64,
        item: Result<T, RemoteError>,
        apply: &impl Fn(&Self, T),
    ) -> bool {
        let state = self.lock();
        if state.epoch != epoch {
            return false;
        }
        match item {
            Ok(snapshot) => apply(self, snapshot),
            // Keep the last good value; the listener may still recover.
            Err(e) => self.errors.report(&e),
        }
        true
    }

    fn teardown(&self, state: &mut WatchState) {
        state.epoch = state.epoch.wrapping_add(1);
        if let Some(active) = state.active.take() {
            for task in &active.tasks {
                task.abort();
            }
            tracing::info!(user_id = %active.identity, "Remote watch stopped");
        }
        self.profile_tx.send_if_modified(|profile| profile.take().is_some());
        self.order_count_tx
            .send_if_modified(|count| std::mem::take(count) != 0);
    }
}

/// Drain one remote listener, publishing each snapshot while `epoch` is current.
async fn run_listener<T, F>(
    inner: Arc<WatcherInner>,
    epoch: u64,
    mut stream: RemoteStream<T>,
    apply: F,
) where
    T: Send + 'static,
    F: Fn(&WatcherInner, T) + Send + 'static,
{
    while let Some(item) = stream.next().await {
        if !inner.publish_if_current(epoch, item, &apply) {
            return;
        }
    }
    tracing::debug!(epoch, "Remote listener stream ended");
}

fn publish_profile(inner: &WatcherInner, document: Option<AccountDocument>) {
    let profile = document.as_ref().map(AccountProfile::from);
    tracing::debug!(present = profile.is_some(), "Profile snapshot");
    inner.profile_tx.send_if_modified(|current| {
        if *current == profile {
            false
        } else {
            *current = profile;
            true
        }
    });
}

fn publish_order_count(inner: &WatcherInner, owner: &UserId, records: &[OrderRecord]) {
    let count = records.iter().filter(|r| &r.user_id == owner).count();
    tracing::debug!(count, "Order snapshot");
    inner.order_count_tx.send_if_modified(|current| {
        if *current == count {
            false
        } else {
            *current = count;
            true
        }
    });
}
