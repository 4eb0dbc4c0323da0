//! Sync core configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional; defaults match the production app.
//!
//! - `GIFTSHOP_UNREAD_POLL_MS` - Unread counter poll interval (default: 1000)
//! - `GIFTSHOP_LOGOUT_SETTLE_MS` - Delay between sign-out and navigation (default: 300)
//! - `GIFTSHOP_UNREAD_KEY` - Persisted unread counter key (default: chatUnreadCount)
//! - `GIFTSHOP_ACCOUNTS_COLLECTION` - Account profile collection (default: accounts)
//! - `GIFTSHOP_ORDERS_COLLECTION` - Order collection (default: orderManager)
//! - `GIFTSHOP_ORDER_OWNER_FIELD` - Owner field on order records (default: userId)
//! - `GIFTSHOP_NOTIFICATION_TITLE` - New-message notification title
//! - `GIFTSHOP_NOTIFICATION_BODY` - New-message notification body
//! - `GIFTSHOP_CURRENCY` - Cart currency (default: USD)
//! - `GIFTSHOP_LOG_FORMAT` - `text` or `json` (default: text)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::time::Duration;

use giftshop_core::CurrencyCode;
use thiserror::Error;

const DEFAULT_UNREAD_POLL_MS: u64 = 1000;
const DEFAULT_LOGOUT_SETTLE_MS: u64 = 300;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// How log lines are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines for local runs.
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Synchronization core configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// How often the unread counter is polled
    pub unread_poll_interval: Duration,
    /// Wait between remote sign-out and navigation to the entry screen
    pub logout_settle_delay: Duration,
    /// Key of the persisted unread counter
    pub unread_key: String,
    /// Collection holding account profile documents
    pub accounts_collection: String,
    /// Collection holding order records
    pub orders_collection: String,
    /// Field on order records that names the owning user
    pub order_owner_field: String,
    /// New-message notification content
    pub notification: NotificationText,
    /// Currency the cart is priced in
    pub currency: CurrencyCode,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Log output format
    pub log_format: LogFormat,
}

/// Title and body of the new-message notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationText {
    pub title: String,
    pub body: String,
}

impl Default for NotificationText {
    fn default() -> Self {
        Self {
            title: "New message".to_string(),
            body: "You have a new message from Admin".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            unread_poll_interval: Duration::from_millis(DEFAULT_UNREAD_POLL_MS),
            logout_settle_delay: Duration::from_millis(DEFAULT_LOGOUT_SETTLE_MS),
            unread_key: "chatUnreadCount".to_string(),
            accounts_collection: "accounts".to_string(),
            orders_collection: "orderManager".to_string(),
            order_owner_field: "userId".to_string(),
            notification: NotificationText::default(),
            currency: CurrencyCode::default(),
            sentry_dsn: None,
            log_format: LogFormat::Text,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid, including
    /// a zero poll interval.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let poll_ms = get_millis_or_default("GIFTSHOP_UNREAD_POLL_MS", DEFAULT_UNREAD_POLL_MS)?;
        if poll_ms == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "GIFTSHOP_UNREAD_POLL_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let settle_ms =
            get_millis_or_default("GIFTSHOP_LOGOUT_SETTLE_MS", DEFAULT_LOGOUT_SETTLE_MS)?;

        let currency = match get_optional_env("GIFTSHOP_CURRENCY") {
            Some(raw) => raw.parse::<CurrencyCode>().map_err(|e| {
                ConfigError::InvalidEnvVar("GIFTSHOP_CURRENCY".to_string(), e)
            })?,
            None => defaults.currency,
        };

        let log_format = match get_optional_env("GIFTSHOP_LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().map_err(|e| {
                ConfigError::InvalidEnvVar("GIFTSHOP_LOG_FORMAT".to_string(), e)
            })?,
            None => defaults.log_format,
        };

        Ok(Self {
            unread_poll_interval: Duration::from_millis(poll_ms),
            logout_settle_delay: Duration::from_millis(settle_ms),
            unread_key: get_non_empty_or_default("GIFTSHOP_UNREAD_KEY", &defaults.unread_key)?,
            accounts_collection: get_non_empty_or_default(
                "GIFTSHOP_ACCOUNTS_COLLECTION",
                &defaults.accounts_collection,
            )?,
            orders_collection: get_non_empty_or_default(
                "GIFTSHOP_ORDERS_COLLECTION",
                &defaults.orders_collection,
            )?,
            order_owner_field: get_non_empty_or_default(
                "GIFTSHOP_ORDER_OWNER_FIELD",
                &defaults.order_owner_field,
            )?,
            notification: NotificationText {
                title: get_env_or_default(
                    "GIFTSHOP_NOTIFICATION_TITLE",
                    &defaults.notification.title,
                ),
                body: get_env_or_default(
                    "GIFTSHOP_NOTIFICATION_BODY",
                    &defaults.notification.body,
                ),
            },
            currency,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            log_format,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an environment variable that must not be blank when set.
fn get_non_empty_or_default(key: &str, default: &str) -> Result<String, ConfigError> {
    let value = get_env_or_default(key, default);
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must not be empty".to_string(),
        ));
    }
    Ok(value)
}

/// Get a millisecond duration with a default value.
fn get_millis_or_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |raw| parse_millis(key, &raw))
}

fn parse_millis(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_app() {
        let config = SyncConfig::default();
        assert_eq!(config.unread_poll_interval, Duration::from_secs(1));
        assert_eq!(config.logout_settle_delay, Duration::from_millis(300));
        assert_eq!(config.unread_key, "chatUnreadCount");
        assert_eq!(config.orders_collection, "orderManager");
        assert_eq!(config.order_owner_field, "userId");
        assert_eq!(config.currency, CurrencyCode::USD);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_parse_millis_valid() {
        assert_eq!(parse_millis("TEST_VAR", " 250 ").unwrap(), 250);
    }

    #[test]
    fn test_parse_millis_invalid() {
        let err = parse_millis("TEST_VAR", "soon").unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "TEST_VAR")
        );
    }

    #[test]
    fn test_get_non_empty_or_default_uses_default_when_unset() {
        let value =
            get_non_empty_or_default("GIFTSHOP_TEST_SURELY_UNSET_VARIABLE", "fallback").unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn test_config_error_display() {
        let err =
            ConfigError::InvalidEnvVar("GIFTSHOP_UNREAD_POLL_MS".to_string(), "bad".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid environment variable GIFTSHOP_UNREAD_POLL_MS: bad"
        );
    }
}
