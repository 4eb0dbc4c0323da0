//! Scenario tests for the Giftshop sync core.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p giftshop-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `session_flow` - sign-in, identity switch, sign-out, cart persistence
//! - `logout` - logout ordering and failure handling
//! - `unread` - unread polling and notification dispatch through a session
//!
//! Every scenario runs against the in-memory collaborators; timer-driven
//! scenarios use Tokio's paused clock.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use giftshop_core::{
    AccountDocument, AuthEvent, CartLine, CurrencyCode, OrderId, OrderRecord, OrderStatus, Price,
    ProductId, SessionState, UserId,
};
use giftshop_sync::memory::{MemoryAuth, MemoryClients};
use giftshop_sync::{AuthError, AuthProvider, HeaderState, SessionLifecycle, SyncConfig};
use tokio::sync::watch;

/// Upper bound for any single step to settle.
pub const WAIT: Duration = Duration::from_secs(5);

/// Wait until `rx` satisfies `ready`, panicking after [`WAIT`].
///
/// # Panics
///
/// Panics if the value does not settle in time or the sender is dropped.
pub async fn wait_until<T>(rx: &mut watch::Receiver<T>, ready: impl FnMut(&T) -> bool) {
    match tokio::time::timeout(WAIT, rx.wait_for(ready)).await {
        Ok(Ok(_)) => {}
        Ok(Err(_)) => panic!("sender dropped while waiting"),
        Err(_) => panic!("value did not settle within {WAIT:?}"),
    }
}

/// Wait until the session reports `expected`.
pub async fn wait_for_state(session: &SessionLifecycle, expected: &SessionState) {
    let mut rx = session.state();
    wait_until(&mut rx, |s| s == expected).await;
}

#[must_use]
pub fn order(id: &str, owner: &UserId) -> OrderRecord {
    OrderRecord {
        id: OrderId::new(id),
        user_id: owner.clone(),
        status: OrderStatus::Pending,
        created_at: Utc::now(),
    }
}

#[must_use]
pub fn account(name: &str, role: i64) -> AccountDocument {
    AccountDocument {
        display_name: Some(name.to_string()),
        email: Some(format!("{}@example.com", name.to_lowercase())),
        role: Some(role),
        profile_image: Some(format!(
            "https://cdn.example.com/{}.jpg",
            name.to_lowercase()
        )),
    }
}

#[must_use]
pub fn line(product: &str, color: &str, size: &str, quantity: u32, minor: i64) -> CartLine {
    CartLine {
        product_id: ProductId::new(product),
        name: product.to_string(),
        unit_price: Price::from_minor(minor, CurrencyCode::USD),
        quantity,
        color: color.to_string(),
        size: size.to_string(),
        image_ref: None,
    }
}

/// What the UI showed at the instant remote sign-out was invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignOutSnapshot {
    pub state: SessionState,
    pub order_count: usize,
    pub profile_present: bool,
    pub header: HeaderState,
    pub unread_badge: u64,
}

/// Auth provider that records the session's published values whenever
/// remote sign-out is invoked, then delegates to [`MemoryAuth`].
#[derive(Clone)]
pub struct ObservingAuth {
    auth: MemoryAuth,
    session: Arc<Mutex<Option<SessionLifecycle>>>,
    snapshots: Arc<Mutex<Vec<SignOutSnapshot>>>,
}

impl ObservingAuth {
    #[must_use]
    pub fn new(auth: MemoryAuth) -> Self {
        Self {
            auth,
            session: Arc::new(Mutex::new(None)),
            snapshots: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Start observing `session`.
    pub fn observe(&self, session: &SessionLifecycle) {
        *self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
    }

    /// Release the session handle.
    pub fn detach(&self) {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<SignOutSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AuthProvider for ObservingAuth {
    fn identity_changes(&self) -> watch::Receiver<AuthEvent> {
        self.auth.identity_changes()
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let snapshot = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| SignOutSnapshot {
                state: session.current_state(),
                order_count: *session.order_count().borrow(),
                profile_present: session.profile().borrow().is_some(),
                header: session.header().current(),
                unread_badge: *session.unread_badge().borrow(),
            });
        if let Some(snapshot) = snapshot {
            self.snapshots
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(snapshot);
        }
        self.auth.sign_out().await
    }
}

/// In-memory collaborators plus a session built from them.
pub struct Harness {
    pub fakes: MemoryClients,
    pub config: SyncConfig,
    pub session: SessionLifecycle,
}

impl Harness {
    /// A harness with default configuration and notifications granted.
    #[must_use]
    pub fn new() -> Self {
        Self::with_fakes(MemoryClients::new())
    }

    #[must_use]
    pub fn with_fakes(fakes: MemoryClients) -> Self {
        let config = SyncConfig::default();
        let session = SessionLifecycle::new(fakes.clients(), config.clone());
        Self {
            fakes,
            config,
            session,
        }
    }

    /// Activate, sign `user` in and wait until the session is authenticated.
    ///
    /// # Panics
    ///
    /// Panics if activation fails or sign-in does not settle.
    pub async fn sign_in(&self, user: &UserId) {
        if let Err(e) = self.session.activate() {
            panic!("activation failed: {e}");
        }
        self.fakes.auth.sign_in(user);
        wait_for_state(&self.session, &SessionState::Authenticated(user.clone())).await;
    }

    pub fn set_unread(&self, value: u64) {
        self.fakes
            .counter
            .set_raw(&self.config.unread_key, &value.to_string());
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
