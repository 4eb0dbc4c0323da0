//! In-memory collaborators.
//!
//! Used by the tests and the CLI driver. Every side effect that matters for
//! ordering (permission requests, vibrations, notifications, sign-out,
//! navigation) is appended to a shared [`EffectLog`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use giftshop_core::{AccountDocument, AuthEvent, OrderId, OrderRecord, PermissionStatus, UserId};
use tokio::sync::watch;

use crate::clients::{
    AuthProvider, Clients, CounterStore, Navigator, NotificationRequest, Notifier, RemoteStore,
    RemoteStream,
};
use crate::error::{AuthError, CounterError, NotifyError, RemoteError};
use crate::sink::RecordingErrorSink;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An observable side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    PermissionRequested,
    Vibrated,
    /// A notification was scheduled, with its title.
    Notified(String),
    SignOutRequested,
    Navigated,
}

/// Ordered record of side effects shared between collaborators.
#[derive(Debug, Clone, Default)]
pub struct EffectLog {
    effects: Arc<Mutex<Vec<Effect>>>,
}

impl EffectLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, effect: Effect) {
        lock(&self.effects).push(effect);
    }

    #[must_use]
    pub fn effects(&self) -> Vec<Effect> {
        lock(&self.effects).clone()
    }

    /// Position of the first occurrence of `effect`.
    #[must_use]
    pub fn position(&self, effect: &Effect) -> Option<usize> {
        lock(&self.effects).iter().position(|e| e == effect)
    }

    #[must_use]
    pub fn contains(&self, effect: &Effect) -> bool {
        self.position(effect).is_some()
    }
}

// =============================================================================
// Remote store
// =============================================================================

type Sender<T> = mpsc::UnboundedSender<Result<T, RemoteError>>;

struct DocumentListener {
    collection: String,
    id: UserId,
    tx: Sender<Option<AccountDocument>>,
}

struct OwnedListener {
    collection: String,
    owner: UserId,
    tx: Sender<Vec<OrderRecord>>,
}

#[derive(Default)]
struct RemoteData {
    documents: HashMap<(String, UserId), AccountDocument>,
    records: HashMap<String, Vec<OrderRecord>>,
    document_listeners: Vec<DocumentListener>,
    owned_listeners: Vec<OwnedListener>,
    failing_subscribes: HashSet<String>,
}

impl RemoteData {
    fn owned_snapshot(&self, collection: &str, owner: &UserId) -> Vec<OrderRecord> {
        self.records
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| &r.user_id == owner)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Push the current document to every listener on it, dropping closed ones.
    fn push_document(&mut self, collection: &str, id: &UserId) {
        let snapshot = self.documents.get(&(collection.to_string(), id.clone())).cloned();
        self.document_listeners.retain(|l| {
            if l.collection != collection || &l.id != id {
                return !l.tx.is_closed();
            }
            l.tx.unbounded_send(Ok(snapshot.clone())).is_ok()
        });
    }

    /// Push fresh owned snapshots for `collection`, dropping closed listeners.
    fn push_owned(&mut self, collection: &str) {
        let mut listeners = std::mem::take(&mut self.owned_listeners);
        listeners.retain(|l| {
            if l.collection != collection {
                return !l.tx.is_closed();
            }
            let snapshot = self.owned_snapshot(collection, &l.owner);
            l.tx.unbounded_send(Ok(snapshot)).is_ok()
        });
        self.owned_listeners = listeners;
    }
}

/// Remote document store held in memory.
///
/// Every write pushes a full snapshot to each live listener whose key it
/// touches. Owned-record listeners filter on [`OrderRecord::user_id`], the
/// only owner field records carry.
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    data: Arc<Mutex<RemoteData>>,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace an account document.
    pub fn put_account(&self, collection: &str, id: &UserId, document: AccountDocument) {
        let mut data = lock(&self.data);
        data.documents
            .insert((collection.to_string(), id.clone()), document);
        data.push_document(collection, id);
    }

    pub fn delete_account(&self, collection: &str, id: &UserId) {
        let mut data = lock(&self.data);
        data.documents.remove(&(collection.to_string(), id.clone()));
        data.push_document(collection, id);
    }

    pub fn add_order(&self, collection: &str, record: OrderRecord) {
        let mut data = lock(&self.data);
        data.records
            .entry(collection.to_string())
            .or_default()
            .push(record);
        data.push_owned(collection);
    }

    pub fn remove_order(&self, collection: &str, id: &OrderId) {
        let mut data = lock(&self.data);
        if let Some(records) = data.records.get_mut(collection) {
            records.retain(|r| &r.id != id);
        }
        data.push_owned(collection);
    }

    /// Deliver a listener error to every live listener on `collection`.
    pub fn fail_listeners(&self, collection: &str, message: &str) {
        let mut data = lock(&self.data);
        let error = || RemoteError::Listener {
            collection: collection.to_string(),
            message: message.to_string(),
        };
        data.document_listeners.retain(|l| {
            l.collection != collection || l.tx.unbounded_send(Err(error())).is_ok()
        });
        data.owned_listeners.retain(|l| {
            l.collection != collection || l.tx.unbounded_send(Err(error())).is_ok()
        });
    }

    /// Make the next subscription on `collection` fail to open.
    pub fn fail_next_subscribe(&self, collection: &str) {
        lock(&self.data)
            .failing_subscribes
            .insert(collection.to_string());
    }

    /// Live owned-record listeners for `owner` on `collection`.
    #[must_use]
    pub fn owned_listener_count(&self, collection: &str, owner: &UserId) -> usize {
        let mut data = lock(&self.data);
        data.owned_listeners.retain(|l| !l.tx.is_closed());
        data.owned_listeners
            .iter()
            .filter(|l| l.collection == collection && &l.owner == owner)
            .count()
    }

    /// Live document listeners on `collection`.
    #[must_use]
    pub fn document_listener_count(&self, collection: &str) -> usize {
        let mut data = lock(&self.data);
        data.document_listeners.retain(|l| !l.tx.is_closed());
        data.document_listeners
            .iter()
            .filter(|l| l.collection == collection)
            .count()
    }
}

fn take_subscribe_failure(data: &mut RemoteData, collection: &str) -> Result<(), RemoteError> {
    if data.failing_subscribes.remove(collection) {
        return Err(RemoteError::Subscribe {
            collection: collection.to_string(),
            message: "listener rejected".to_string(),
        });
    }
    Ok(())
}

impl RemoteStore for MemoryRemoteStore {
    fn subscribe_document(
        &self,
        collection: &str,
        id: &UserId,
    ) -> Result<RemoteStream<Option<AccountDocument>>, RemoteError> {
        let mut data = lock(&self.data);
        take_subscribe_failure(&mut data, collection)?;

        let (tx, rx) = mpsc::unbounded();
        let snapshot = data
            .documents
            .get(&(collection.to_string(), id.clone()))
            .cloned();
        // The receiver is alive, so the initial send cannot fail.
        let _ = tx.unbounded_send(Ok(snapshot));
        data.document_listeners.push(DocumentListener {
            collection: collection.to_string(),
            id: id.clone(),
            tx,
        });
        Ok(rx.boxed())
    }

    fn subscribe_owned(
        &self,
        collection: &str,
        owner_field: &str,
        owner: &UserId,
    ) -> Result<RemoteStream<Vec<OrderRecord>>, RemoteError> {
        let mut data = lock(&self.data);
        take_subscribe_failure(&mut data, collection)?;
        tracing::debug!(collection, owner_field, owner = %owner, "Memory listener opened");

        let (tx, rx) = mpsc::unbounded();
        let _ = tx.unbounded_send(Ok(data.owned_snapshot(collection, owner)));
        data.owned_listeners.push(OwnedListener {
            collection: collection.to_string(),
            owner: owner.clone(),
            tx,
        });
        Ok(rx.boxed())
    }
}

// =============================================================================
// Counter store
// =============================================================================

#[derive(Default)]
struct CounterData {
    values: HashMap<String, String>,
    fail_reads: bool,
    fail_writes: bool,
}

/// Key/value storage held in memory.
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    data: Arc<Mutex<CounterData>>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a value directly, as the chat surface would.
    pub fn set_raw(&self, key: &str, value: &str) {
        lock(&self.data)
            .values
            .insert(key.to_string(), value.to_string());
    }

    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        lock(&self.data).values.get(key).cloned()
    }

    pub fn fail_reads(&self, fail: bool) {
        lock(&self.data).fail_reads = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        lock(&self.data).fail_writes = fail;
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CounterError> {
        let data = lock(&self.data);
        if data.fail_reads {
            return Err(CounterError::Storage("read failed".to_string()));
        }
        Ok(data.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CounterError> {
        let mut data = lock(&self.data);
        if data.fail_writes {
            return Err(CounterError::Storage("write failed".to_string()));
        }
        data.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// =============================================================================
// Notifier
// =============================================================================

struct NotifierData {
    answer: PermissionStatus,
    permission_requests: usize,
    vibrations: usize,
    notifications: Vec<NotificationRequest>,
    fail_schedules: bool,
}

/// Notification surface that records instead of showing anything.
#[derive(Clone)]
pub struct MemoryNotifier {
    data: Arc<Mutex<NotifierData>>,
    log: EffectLog,
}

impl MemoryNotifier {
    /// A notifier whose permission prompt answers `answer`.
    #[must_use]
    pub fn new(answer: PermissionStatus, log: EffectLog) -> Self {
        Self {
            data: Arc::new(Mutex::new(NotifierData {
                answer,
                permission_requests: 0,
                vibrations: 0,
                notifications: Vec::new(),
                fail_schedules: false,
            })),
            log,
        }
    }

    #[must_use]
    pub fn granting(log: EffectLog) -> Self {
        Self::new(PermissionStatus::Granted, log)
    }

    #[must_use]
    pub fn denying(log: EffectLog) -> Self {
        Self::new(PermissionStatus::Denied, log)
    }

    pub fn fail_schedules(&self, fail: bool) {
        lock(&self.data).fail_schedules = fail;
    }

    #[must_use]
    pub fn permission_requests(&self) -> usize {
        lock(&self.data).permission_requests
    }

    #[must_use]
    pub fn vibrations(&self) -> usize {
        lock(&self.data).vibrations
    }

    #[must_use]
    pub fn notifications(&self) -> Vec<NotificationRequest> {
        lock(&self.data).notifications.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn request_permission(&self) -> Result<PermissionStatus, NotifyError> {
        let answer = {
            let mut data = lock(&self.data);
            data.permission_requests += 1;
            data.answer
        };
        self.log.record(Effect::PermissionRequested);
        Ok(answer)
    }

    async fn schedule(&self, request: NotificationRequest) -> Result<(), NotifyError> {
        {
            let mut data = lock(&self.data);
            if data.fail_schedules {
                return Err(NotifyError::Schedule(
                    "notification service unavailable".to_string(),
                ));
            }
            data.notifications.push(request.clone());
        }
        self.log.record(Effect::Notified(request.title));
        Ok(())
    }

    async fn vibrate(&self) -> Result<(), NotifyError> {
        lock(&self.data).vibrations += 1;
        self.log.record(Effect::Vibrated);
        Ok(())
    }
}

// =============================================================================
// Auth
// =============================================================================

/// Identity provider driven by hand.
#[derive(Clone)]
pub struct MemoryAuth {
    events: Arc<watch::Sender<AuthEvent>>,
    reject_sign_out: Arc<Mutex<bool>>,
    log: EffectLog,
}

impl MemoryAuth {
    #[must_use]
    pub fn new(log: EffectLog) -> Self {
        let (events, _) = watch::channel(AuthEvent::SignedOut);
        Self {
            events: Arc::new(events),
            reject_sign_out: Arc::new(Mutex::new(false)),
            log,
        }
    }

    pub fn begin_sign_in(&self) {
        self.events.send_replace(AuthEvent::SigningIn);
    }

    pub fn complete_sign_in(&self, user_id: &UserId) {
        self.events.send_replace(AuthEvent::SignedIn(user_id.clone()));
    }

    /// Begin and complete a sign-in in one step.
    pub fn sign_in(&self, user_id: &UserId) {
        self.begin_sign_in();
        self.complete_sign_in(user_id);
    }

    pub fn fail_sign_in(&self, reason: &str) {
        self.events.send_replace(AuthEvent::Failed(reason.to_string()));
    }

    /// Sign out from outside the app (token expiry, another device).
    pub fn expire(&self) {
        self.events.send_replace(AuthEvent::SignedOut);
    }

    pub fn reject_sign_outs(&self, reject: bool) {
        *lock(&self.reject_sign_out) = reject;
    }

    #[must_use]
    pub fn current(&self) -> AuthEvent {
        self.events.borrow().clone()
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    fn identity_changes(&self) -> watch::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.log.record(Effect::SignOutRequested);
        if *lock(&self.reject_sign_out) {
            return Err(AuthError::SignOutRejected(
                "network unavailable".to_string(),
            ));
        }
        self.events.send_replace(AuthEvent::SignedOut);
        Ok(())
    }
}

// =============================================================================
// Navigator
// =============================================================================

/// Navigator that records instead of swapping screens.
#[derive(Clone)]
pub struct MemoryNavigator {
    fail: Arc<Mutex<bool>>,
    log: EffectLog,
}

impl MemoryNavigator {
    #[must_use]
    pub fn new(log: EffectLog) -> Self {
        Self {
            fail: Arc::new(Mutex::new(false)),
            log,
        }
    }

    pub fn fail_navigation(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }
}

#[async_trait]
impl Navigator for MemoryNavigator {
    async fn navigate_to_entry(&self) -> Result<(), String> {
        if *lock(&self.fail) {
            return Err("entry screen unavailable".to_string());
        }
        self.log.record(Effect::Navigated);
        Ok(())
    }
}

// =============================================================================
// Bundle
// =============================================================================

/// Concrete in-memory collaborators sharing one [`EffectLog`].
///
/// Keep this around to drive and inspect the fakes; hand
/// [`MemoryClients::clients`] to the code under test.
#[derive(Clone)]
pub struct MemoryClients {
    pub log: EffectLog,
    pub remote: MemoryRemoteStore,
    pub counter: MemoryCounterStore,
    pub notifier: MemoryNotifier,
    pub auth: MemoryAuth,
    pub navigator: MemoryNavigator,
    pub errors: RecordingErrorSink,
}

impl Default for MemoryClients {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClients {
    /// Collaborators whose notification prompt is granted.
    #[must_use]
    pub fn new() -> Self {
        Self::with_permission(PermissionStatus::Granted)
    }

    #[must_use]
    pub fn with_permission(answer: PermissionStatus) -> Self {
        let log = EffectLog::new();
        Self {
            remote: MemoryRemoteStore::new(),
            counter: MemoryCounterStore::new(),
            notifier: MemoryNotifier::new(answer, log.clone()),
            auth: MemoryAuth::new(log.clone()),
            navigator: MemoryNavigator::new(log.clone()),
            errors: RecordingErrorSink::new(),
            log,
        }
    }

    #[must_use]
    pub fn clients(&self) -> Clients {
        Clients {
            remote: Arc::new(self.remote.clone()),
            counter: Arc::new(self.counter.clone()),
            notifier: Arc::new(self.notifier.clone()),
            auth: Arc::new(self.auth.clone()),
            navigator: Arc::new(self.navigator.clone()),
            errors: Arc::new(self.errors.clone()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use giftshop_core::OrderStatus;

    use super::*;

    fn order(id: &str, owner: &str) -> OrderRecord {
        OrderRecord {
            id: OrderId::new(id),
            user_id: UserId::new(owner),
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_owned_listener_gets_initial_and_filtered_snapshots() {
        let remote = MemoryRemoteStore::new();
        let alice = UserId::new("alice");
        remote.add_order("orders", order("o1", "alice"));
        remote.add_order("orders", order("o2", "bob"));

        let mut stream = remote.subscribe_owned("orders", "userId", &alice).unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().len(), 1);

        remote.add_order("orders", order("o3", "alice"));
        assert_eq!(stream.next().await.unwrap().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_document_yields_none() {
        let remote = MemoryRemoteStore::new();
        let alice = UserId::new("alice");
        let mut stream = remote.subscribe_document("accounts", &alice).unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), None);

        remote.put_account("accounts", &alice, AccountDocument::default());
        assert!(stream.next().await.unwrap().unwrap().is_some());

        remote.delete_account("accounts", &alice);
        assert_eq!(stream.next().await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_dropped_stream_detaches_listener() {
        let remote = MemoryRemoteStore::new();
        let alice = UserId::new("alice");
        let stream = remote.subscribe_owned("orders", "userId", &alice).unwrap();
        assert_eq!(remote.owned_listener_count("orders", &alice), 1);

        drop(stream);
        assert_eq!(remote.owned_listener_count("orders", &alice), 0);
    }

    #[test]
    fn test_fail_next_subscribe_applies_once() {
        let remote = MemoryRemoteStore::new();
        let alice = UserId::new("alice");
        remote.fail_next_subscribe("accounts");

        assert!(remote.subscribe_document("accounts", &alice).is_err());
        assert!(remote.subscribe_document("accounts", &alice).is_ok());
    }

    #[tokio::test]
    async fn test_auth_sign_out_records_and_publishes() {
        let log = EffectLog::new();
        let auth = MemoryAuth::new(log.clone());
        let rx = auth.identity_changes();
        auth.sign_in(&UserId::new("alice"));
        assert_eq!(rx.borrow().identity(), Some(&UserId::new("alice")));

        auth.sign_out().await.unwrap();
        assert_eq!(auth.current(), AuthEvent::SignedOut);
        assert_eq!(log.effects(), vec![Effect::SignOutRequested]);
    }

    #[tokio::test]
    async fn test_rejected_sign_out_keeps_identity() {
        let auth = MemoryAuth::new(EffectLog::new());
        auth.sign_in(&UserId::new("alice"));
        auth.reject_sign_outs(true);

        assert!(auth.sign_out().await.is_err());
        assert_eq!(auth.current(), AuthEvent::SignedIn(UserId::new("alice")));
    }
}
