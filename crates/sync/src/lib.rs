//! Giftshop Sync - client-side reactive synchronization core.
//!
//! Keeps local UI state (cart contents, order count, account profile,
//! unread-message badge) consistent with a remote, independently mutating
//! document store across sign-in/sign-out churn.
//!
//! # Components
//!
//! - [`RemoteStateWatcher`] - live profile and order-count subscriptions for one identity
//! - [`LocalUnreadTracker`] - polls the persisted unread counter and detects rising edges
//! - [`NotificationDispatcher`] - turns rising edges into haptic pulses and system notifications
//! - [`CartStore`] - in-memory cart with merge semantics and derived totals
//! - [`SessionLifecycle`] - binds all of the above to authentication transitions
//!
//! All collaborators (remote store, counter storage, notifications, auth,
//! navigation) are injected through [`Clients`]; [`memory`] provides
//! in-memory implementations for tests and the CLI.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod clients;
pub mod config;
pub mod error;
pub mod header;
pub mod memory;
pub mod notify;
pub mod session;
pub mod sink;
pub mod unread;
pub mod watcher;

pub use cart::CartStore;
pub use clients::{
    AuthProvider, Clients, CounterStore, Navigator, NotificationRequest, Notifier, RemoteStore,
    RemoteStream,
};
pub use config::{ConfigError, LogFormat, SyncConfig};
pub use error::{AuthError, CartError, CounterError, NotifyError, RemoteError, SessionError};
pub use header::{HeaderState, HeaderUi};
pub use notify::{DispatchOutcome, NotificationDispatcher};
pub use session::SessionLifecycle;
pub use sink::{ErrorSink, RecordingErrorSink, TracingErrorSink};
pub use unread::{LocalUnreadTracker, NewMessage, UnreadState};
pub use watcher::RemoteStateWatcher;
