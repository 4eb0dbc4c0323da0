//! Collaborator traits and the injected client bundle.
//!
//! The sync core never reaches for global handles. Each collaborator is a
//! trait object constructed by the host app and passed in through
//! [`Clients`]:
//!
//! - [`RemoteStore`] - live document and filtered-collection listeners
//! - [`CounterStore`] - persisted key/value storage holding the unread counter
//! - [`Notifier`] - permission, haptics and system notifications
//! - [`AuthProvider`] - identity transitions and remote sign-out
//! - [`Navigator`] - screen navigation after logout
//! - [`ErrorSink`] - destination for non-fatal remote errors

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use giftshop_core::{AccountDocument, AuthEvent, OrderRecord, PermissionStatus, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{AuthError, CounterError, NotifyError, RemoteError};
use crate::sink::ErrorSink;

/// A live push source from the remote store.
///
/// Each item is a full snapshot. Dropping the stream detaches the remote
/// listener.
pub type RemoteStream<T> = BoxStream<'static, Result<T, RemoteError>>;

/// Remote document store.
pub trait RemoteStore: Send + Sync {
    /// Listen to a single document.
    ///
    /// Yields `None` while the document does not exist.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the listener cannot be opened.
    fn subscribe_document(
        &self,
        collection: &str,
        id: &UserId,
    ) -> Result<RemoteStream<Option<AccountDocument>>, RemoteError>;

    /// Listen to every record in `collection` whose `owner_field` equals `owner`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the listener cannot be opened.
    fn subscribe_owned(
        &self,
        collection: &str,
        owner_field: &str,
        owner: &UserId,
    ) -> Result<RemoteStream<Vec<OrderRecord>>, RemoteError>;
}

/// Persisted key/value storage (survives restarts, no transactions).
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the raw stored value, `None` if the key was never written.
    async fn get(&self, key: &str) -> Result<Option<String>, CounterError>;

    /// Write a raw value.
    async fn set(&self, key: &str, value: &str) -> Result<(), CounterError>;
}

/// A system notification to schedule immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub sound: bool,
}

/// Device notification surface.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn request_permission(&self) -> Result<PermissionStatus, NotifyError>;

    async fn schedule(&self, request: NotificationRequest) -> Result<(), NotifyError>;

    async fn vibrate(&self) -> Result<(), NotifyError>;
}

/// Identity provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Receiver that holds the latest authentication transition.
    ///
    /// The current value is available immediately; every later transition
    /// is delivered as a change.
    fn identity_changes(&self) -> watch::Receiver<AuthEvent>;

    /// Sign the current identity out remotely.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Screen navigation.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Replace the view tree with the entry screen.
    async fn navigate_to_entry(&self) -> Result<(), String>;
}

/// Every collaborator handle the sync core needs.
///
/// Cheaply cloneable; all fields are `Arc`-wrapped.
#[derive(Clone)]
pub struct Clients {
    pub remote: Arc<dyn RemoteStore>,
    pub counter: Arc<dyn CounterStore>,
    pub notifier: Arc<dyn Notifier>,
    pub auth: Arc<dyn AuthProvider>,
    pub navigator: Arc<dyn Navigator>,
    pub errors: Arc<dyn ErrorSink>,
}
