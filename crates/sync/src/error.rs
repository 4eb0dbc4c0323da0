//! Error types for the synchronization core, plus Sentry scope helpers.
//!
//! Only [`CartError`] and [`SessionError`] ever reach a caller. Remote,
//! counter and notification failures are non-fatal: they are logged or
//! reported to the [`ErrorSink`](crate::sink::ErrorSink) and the loop that
//! hit them carries on.

use giftshop_core::{CurrencyCode, UserId};
use thiserror::Error;

/// Errors returned by [`CartStore`](crate::CartStore) mutations.
///
/// Every variant leaves the cart unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Quantity below 1 (or beyond what a line can hold).
    #[error("invalid quantity: {requested}")]
    InvalidQuantity { requested: i64 },

    /// No line with the given key.
    #[error("cart line not found")]
    LineNotFound,

    /// Line priced in a different currency than the cart.
    #[error("currency mismatch: cart is {expected:?}, line is {found:?}")]
    CurrencyMismatch {
        expected: CurrencyCode,
        found: CurrencyCode,
    },
}

/// Errors from the remote document store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Opening a listener failed.
    #[error("subscribe to {collection} failed: {message}")]
    Subscribe { collection: String, message: String },

    /// A live listener delivered an error instead of a snapshot.
    #[error("listener on {collection} failed: {message}")]
    Listener { collection: String, message: String },

    /// Security rules rejected the read.
    #[error("permission denied on {0}")]
    PermissionDenied(String),
}

/// Errors reading or writing the persisted unread counter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CounterError {
    /// Storage backend failed.
    #[error("counter storage error: {0}")]
    Storage(String),

    /// Stored value is not a non-negative integer.
    #[error("counter {key} holds an invalid value: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Errors from the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("permission request failed: {0}")]
    Permission(String),

    #[error("failed to schedule notification: {0}")]
    Schedule(String),

    #[error("vibration unavailable: {0}")]
    Vibrate(String),
}

/// Errors from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The remote sign-out call rejected.
    #[error("sign-out rejected: {0}")]
    SignOutRejected(String),

    /// The provider is unreachable.
    #[error("auth provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by [`SessionLifecycle`](crate::SessionLifecycle).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Remote sign-out failed. Local state already cleared is not restored.
    #[error("sign-out failed: {0}")]
    SignOut(#[from] AuthError),

    /// Navigation after sign-out failed.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The session has been disposed and cannot be used again.
    #[error("session has been disposed")]
    Disposed,
}

/// Set the Sentry user context from a user ID.
///
/// Call this on entry to an authenticated session to associate errors with users.
pub fn set_sentry_user(user_id: &UserId) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on session exit to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for session and cart actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added line", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
