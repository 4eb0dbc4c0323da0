//! Remote document shapes and the values derived from them.
//!
//! [`AccountDocument`] and [`OrderRecord`] mirror what the remote document
//! store holds. [`AccountProfile`] is the read-only projection the header
//! displays.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{OrderId, UserId};
use super::status::OrderStatus;

/// Display name used when the account has none.
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// Role code stored for admin accounts.
pub const ADMIN_ROLE: i64 = 1;

/// An account document as stored remotely, keyed by the user's UID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountDocument {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<i64>,
    pub profile_image: Option<String>,
}

/// The profile shown in the header: avatar, name and role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub photo_url: Option<String>,
    pub display_name: String,
    pub role: i64,
}

impl AccountProfile {
    /// Whether this account routes to the admin screens.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

impl From<&AccountDocument> for AccountProfile {
    fn from(doc: &AccountDocument) -> Self {
        let display_name = doc
            .display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME)
            .to_string();
        let photo_url = doc
            .profile_image
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        Self {
            photo_url,
            display_name,
            role: doc.role.unwrap_or(0),
        }
    }
}

/// An order record in the remote order collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: OrderId,
    /// Owner field the order filter matches on.
    pub user_id: UserId,
    #[serde(default)]
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults_display_name() {
        let doc = AccountDocument::default();
        let profile = AccountProfile::from(&doc);
        assert_eq!(profile.display_name, "User");
        assert_eq!(profile.photo_url, None);
        assert_eq!(profile.role, 0);
        assert!(!profile.is_admin());
    }

    #[test]
    fn test_profile_blank_name_falls_back() {
        let doc = AccountDocument {
            display_name: Some("   ".to_string()),
            profile_image: Some(String::new()),
            ..AccountDocument::default()
        };
        let profile = AccountProfile::from(&doc);
        assert_eq!(profile.display_name, "User");
        assert_eq!(profile.photo_url, None);
    }

    #[test]
    fn test_profile_from_remote_json() {
        let doc: AccountDocument = serde_json::from_str(
            r#"{"displayName":"Lan","email":"lan@example.com","role":1,"profileImage":"https://img/lan.jpg"}"#,
        )
        .unwrap();
        let profile = AccountProfile::from(&doc);
        assert_eq!(profile.display_name, "Lan");
        assert_eq!(profile.photo_url.as_deref(), Some("https://img/lan.jpg"));
        assert!(profile.is_admin());
    }
}
