//! Session lifecycle: binds every subscription and timer to the identity.
//!
//! ```text
//! Unauthenticated --SigningIn--> Authenticating --SignedIn--> Authenticated
//!        ^                             |                           |
//!        +----------Failed-------------+                           |
//!        +------------------SignedOut / logout()-------------------+
//! ```
//!
//! Entering `Authenticated` starts the [`RemoteStateWatcher`] and the
//! [`LocalUnreadTracker`]. Leaving it, by any path, stops both and clears
//! identity-derived state (profile, order count, unread badge, header
//! overlays). The cart is left alone: it persists across identities.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use giftshop_core::{AccountProfile, AuthEvent, PermissionStatus, SessionState, UserId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::cart::CartStore;
use crate::clients::Clients;
use crate::config::SyncConfig;
use crate::error::{SessionError, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::header::HeaderUi;
use crate::notify::NotificationDispatcher;
use crate::unread::LocalUnreadTracker;
use crate::watcher::RemoteStateWatcher;

/// Owner of every identity-scoped component.
///
/// Lifecycle is `new` (init) -> [`activate`](Self::activate) (active) ->
/// [`dispose`](Self::dispose) (disposed). Cheaply cloneable; clones share
/// the same session.
#[derive(Clone)]
pub struct SessionLifecycle {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    clients: Clients,
    config: SyncConfig,
    watcher: RemoteStateWatcher,
    tracker: LocalUnreadTracker,
    dispatcher: NotificationDispatcher,
    cart: CartStore,
    header: HeaderUi,
    state_tx: watch::Sender<SessionState>,
    control: Mutex<Control>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Active,
    Disposed,
}

struct Control {
    phase: Phase,
    auth_task: Option<JoinHandle<()>>,
    permission_task: Option<JoinHandle<()>>,
}

impl SessionLifecycle {
    /// Build every component from injected collaborators. Nothing runs until
    /// [`activate`](Self::activate).
    #[must_use]
    pub fn new(clients: Clients, config: SyncConfig) -> Self {
        let watcher = RemoteStateWatcher::new(
            Arc::clone(&clients.remote),
            Arc::clone(&clients.errors),
            &config,
        );
        let tracker = LocalUnreadTracker::new(
            Arc::clone(&clients.counter),
            config.unread_key.clone(),
            config.unread_poll_interval,
        );
        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&clients.notifier),
            config.notification.clone(),
        );
        let (state_tx, _) = watch::channel(SessionState::Unauthenticated);

        Self {
            inner: Arc::new(SessionInner {
                cart: CartStore::new(config.currency),
                header: HeaderUi::new(),
                clients,
                config,
                watcher,
                tracker,
                dispatcher,
                state_tx,
                control: Mutex::new(Control {
                    phase: Phase::Init,
                    auth_task: None,
                    permission_task: None,
                }),
            }),
        }
    }

    /// Start following the identity provider and ask for notification
    /// permission. The two run independently: an unanswered permission prompt
    /// never holds up sign-in. The current identity is applied as soon as the
    /// follower runs. Calling this on an active session is a no-op. Must be
    /// called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Disposed` after [`dispose`](Self::dispose).
    pub fn activate(&self) -> Result<(), SessionError> {
        let mut control = self.inner.lock();
        match control.phase {
            Phase::Disposed => return Err(SessionError::Disposed),
            Phase::Active => return Ok(()),
            Phase::Init => {}
        }

        let dispatcher = self.inner.dispatcher.clone();
        control.permission_task = Some(tokio::spawn(async move {
            dispatcher.request_permission().await;
        }));
        let rx = self.inner.clients.auth.identity_changes();
        control.auth_task = Some(tokio::spawn(follow_identity(
            Arc::downgrade(&self.inner),
            rx,
        )));
        control.phase = Phase::Active;
        tracing::info!("Session activated");
        Ok(())
    }

    /// Wait for the notification permission answer, asking if nobody has
    /// yet. The prompt is shown at most once per session.
    pub async fn request_permission(&self) -> PermissionStatus {
        self.inner.dispatcher.request_permission().await
    }

    /// Apply one authentication transition. Ignored once disposed.
    pub fn handle_auth_event(&self, event: AuthEvent) {
        self.inner.handle_auth_event(event);
    }

    /// Sign out: stop subscriptions, clear identity-derived UI state, invoke
    /// the remote sign-out, wait the settle delay, then navigate to the entry
    /// screen.
    ///
    /// Local state is cleared before the remote call and is not restored if
    /// that call fails.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SignOut` if the remote sign-out rejects (no
    /// navigation happens), `SessionError::Navigation` if navigation fails,
    /// or `SessionError::Disposed` after [`dispose`](Self::dispose).
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), SessionError> {
        {
            let control = self.inner.lock();
            if control.phase == Phase::Disposed {
                return Err(SessionError::Disposed);
            }
            self.inner.exit();
        }
        add_breadcrumb("session", "Logout requested", None);

        if let Err(e) = self.inner.clients.auth.sign_out().await {
            tracing::error!(error = %e, "Remote sign-out failed");
            return Err(e.into());
        }

        tokio::time::sleep(self.inner.config.logout_settle_delay).await;

        self.inner
            .clients
            .navigator
            .navigate_to_entry()
            .await
            .map_err(SessionError::Navigation)?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// Stop following the identity provider and tear everything down.
    /// Safe to call repeatedly.
    pub fn dispose(&self) {
        let mut control = self.inner.lock();
        if control.phase == Phase::Disposed {
            return;
        }
        for task in [control.auth_task.take(), control.permission_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
        self.inner.exit();
        control.phase = Phase::Disposed;
        tracing::info!("Session disposed");
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.lock().phase == Phase::Disposed
    }

    /// Receiver for the session state.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    #[must_use]
    pub fn current_state(&self) -> SessionState {
        self.inner.state_tx.borrow().clone()
    }

    #[must_use]
    pub fn identity(&self) -> Option<UserId> {
        self.inner.state_tx.borrow().identity().cloned()
    }

    #[must_use]
    pub fn profile(&self) -> watch::Receiver<Option<AccountProfile>> {
        self.inner.watcher.profile()
    }

    #[must_use]
    pub fn order_count(&self) -> watch::Receiver<usize> {
        self.inner.watcher.order_count()
    }

    #[must_use]
    pub fn unread_badge(&self) -> watch::Receiver<u64> {
        self.inner.tracker.badge()
    }

    /// Whether the latest published profile carries the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.inner
            .watcher
            .current_profile()
            .is_some_and(|profile| profile.is_admin())
    }

    #[must_use]
    pub fn permission(&self) -> PermissionStatus {
        self.inner.dispatcher.permission()
    }

    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    #[must_use]
    pub fn header(&self) -> &HeaderUi {
        &self.inner.header
    }

    #[must_use]
    pub fn watcher(&self) -> &RemoteStateWatcher {
        &self.inner.watcher
    }

    #[must_use]
    pub fn tracker(&self) -> &LocalUnreadTracker {
        &self.inner.tracker
    }
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Transitions run under the control lock so that the auth listener,
    /// `logout` and `dispose` never interleave.
    fn handle_auth_event(&self, event: AuthEvent) {
        let control = self.lock();
        if control.phase == Phase::Disposed {
            return;
        }

        match event {
            AuthEvent::SigningIn => {
                self.exit();
                self.set_state(SessionState::Authenticating);
            }
            AuthEvent::SignedIn(user_id) => {
                if self.state_tx.borrow().identity() == Some(&user_id) {
                    return;
                }
                self.exit();
                self.enter(&user_id);
            }
            AuthEvent::SignedOut => self.exit(),
            AuthEvent::Failed(reason) => {
                tracing::warn!(reason = %reason, "Sign-in failed");
                self.exit();
            }
        }
    }

    fn enter(&self, user_id: &UserId) {
        self.watcher.start(user_id);
        self.tracker.start(self.dispatcher.clone());
        set_sentry_user(user_id);
        add_breadcrumb(
            "session",
            "Signed in",
            Some(&[("user_id", user_id.as_str())]),
        );
        self.set_state(SessionState::Authenticated(user_id.clone()));
        tracing::info!(user_id = %user_id, "Session authenticated");
    }

    /// Leave whatever state the session is in. Idempotent. Callers hold the
    /// control lock.
    fn exit(&self) {
        let previous = self.state_tx.borrow().identity().cloned();
        self.watcher.stop();
        self.tracker.stop();
        self.header.clear();
        self.set_state(SessionState::Unauthenticated);
        if let Some(user_id) = previous {
            clear_sentry_user();
            tracing::info!(user_id = %user_id, "Session ended");
        }
    }

    fn set_state(&self, next: SessionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                tracing::debug!(from = %state, to = %next, "Session state");
                *state = next;
                true
            }
        });
    }
}

/// Apply the provider's current identity, then every later transition, until
/// the session is dropped or the provider goes away.
async fn follow_identity(session: Weak<SessionInner>, mut rx: watch::Receiver<AuthEvent>) {
    let initial = rx.borrow_and_update().clone();
    match session.upgrade() {
        Some(inner) => inner.handle_auth_event(initial),
        None => return,
    }

    while rx.changed().await.is_ok() {
        let event = rx.borrow_and_update().clone();
        let Some(inner) = session.upgrade() else {
            return;
        };
        inner.handle_auth_event(event);
    }
    tracing::debug!("Identity provider closed");
}
