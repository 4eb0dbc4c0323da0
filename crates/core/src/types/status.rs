//! Status enums for sessions, permissions and orders.

use serde::{Deserialize, Serialize};

use super::id::UserId;

/// Order status as tracked on the order status screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Shipping,
    Delivered,
    Cancelled,
}

/// Authentication transition delivered by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthEvent {
    /// No identity.
    #[default]
    SignedOut,
    /// A sign-in is in flight.
    SigningIn,
    /// An identity is present.
    SignedIn(UserId),
    /// The in-flight sign-in failed.
    Failed(String),
}

impl AuthEvent {
    /// The identity carried by this event, if any.
    #[must_use]
    pub const fn identity(&self) -> Option<&UserId> {
        match self {
            Self::SignedIn(uid) => Some(uid),
            _ => None,
        }
    }
}

/// Session lifecycle state.
///
/// `Unauthenticated -> Authenticating -> Authenticated -> Unauthenticated`,
/// or `Authenticating -> Unauthenticated` when sign-in fails.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated(UserId),
}

impl SessionState {
    /// The active identity, if authenticated.
    #[must_use]
    pub const fn identity(&self) -> Option<&UserId> {
        match self {
            Self::Authenticated(uid) => Some(uid),
            _ => None,
        }
    }

    /// Whether the session holds an identity.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Authenticated(uid) => write!(f, "authenticated({uid})"),
        }
    }
}

/// Outcome of a notification permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// Not requested yet.
    #[default]
    Undetermined,
    Granted,
    Denied,
}

impl PermissionStatus {
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undetermined => write!(f, "undetermined"),
            Self::Granted => write!(f, "granted"),
            Self::Denied => write!(f, "denied"),
        }
    }
}

impl std::str::FromStr for PermissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "undetermined" => Ok(Self::Undetermined),
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            _ => Err(format!("invalid permission status: {s}")),
        }
    }
}
