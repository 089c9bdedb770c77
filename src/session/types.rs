/// Session data model: user record, credentials, results and events
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// USER
// =============================================================================

/// Backend user ids are integers for password accounts and opaque strings
/// for Telegram / wallet accounts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Numeric(i64),
    Text(String),
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserId::Numeric(id) => write!(f, "{}", id),
            UserId::Text(id) => write!(f, "{}", id),
        }
    }
}

/// Daily API quota, sent as top-level fields of the user record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageCounters {
    #[serde(default)]
    pub api_calls_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<u32>,
}

fn default_tier() -> String {
    "free".to_string()
}

/// Current user as returned by `GET /api/auth/me`
///
/// Fields the client does not model are kept in `extra`, so merging a
/// partial update and re-caching never loses them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_tier")]
    pub subscription_tier: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub mfa_enabled: bool,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(flatten)]
    pub usage: UsageCounters,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// Best label for greetings and log lines
    pub fn display_name(&self) -> String {
        self.username
            .clone()
            .or_else(|| self.name.clone())
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| format!("user {}", self.id))
    }

    /// Shallow-merge `partial` (a JSON object) into this record
    ///
    /// Returns an error if the merged record no longer describes a user,
    /// e.g. `id` was set to `null`.
    pub fn merged_with(&self, partial: &Map<String, Value>) -> Result<User, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(fields) = &mut value {
            for (key, v) in partial {
                fields.insert(key.clone(), v.clone());
            }
        }
        serde_json::from_value(value)
    }
}

// =============================================================================
// CREDENTIALS
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PasswordCredentials {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mfa_code: Option<String>,
    pub remember_me: bool,
}

/// Payload of the Telegram login widget
#[derive(Debug, Clone, Serialize)]
pub struct TelegramAuthData {
    pub id: i64,
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub auth_date: i64,
    pub hash: String,
}

/// Signed wallet challenge
#[derive(Debug, Clone, Serialize)]
pub struct WalletAuthData {
    pub address: String,
    pub signature: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum Credentials {
    Password(PasswordCredentials),
    Telegram(TelegramAuthData),
    Wallet(WalletAuthData),
}

impl Credentials {
    pub fn password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Password(PasswordCredentials {
            email: email.into(),
            password: password.into(),
            mfa_code: None,
            remember_me: false,
        })
    }

    /// Short label for logs; never includes secrets
    pub fn method(&self) -> &'static str {
        match self {
            Credentials::Password(_) => "password",
            Credentials::Telegram(_) => "telegram",
            Credentials::Wallet(_) => "wallet",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterData {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub terms_accepted: bool,
}

// =============================================================================
// RESULTS
// =============================================================================

/// Outcome of Login / Register. Expected failures are values, not errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthResult {
    pub success: bool,
    pub error: Option<String>,
    pub rate_limited: bool,
    pub account_locked: bool,
    pub requires_mfa: bool,
}

impl AuthResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

// =============================================================================
// SECURITY EVENTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Error,
    Warning,
    Info,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Error => "error",
            EventKind::Warning => "warning",
            EventKind::Info => "info",
        }
    }
}

/// Machine-readable codes attached to events
pub mod codes {
    pub const LOGIN_SUCCESS: &str = "LOGIN_SUCCESS";
    pub const LOGIN_FAILED: &str = "LOGIN_FAILED";
    pub const REGISTER_SUCCESS: &str = "REGISTER_SUCCESS";
    pub const REGISTER_FAILED: &str = "REGISTER_FAILED";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const ACCOUNT_LOCKED: &str = "ACCOUNT_LOCKED";
    pub const MFA_REQUIRED: &str = "MFA_REQUIRED";
    pub const LOGOUT: &str = "LOGOUT";
    pub const SESSION_EXPIRED: &str = "SESSION_EXPIRED";
    pub const OFFLINE: &str = "OFFLINE";
    pub const CONNECTION_FAILED: &str = "CONNECTION_FAILED";
}

/// Transient, classified notification shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityEvent {
    /// Monotonic per manager; lets an auto-hide timer tell its event apart
    pub id: u64,
    pub kind: EventKind,
    pub message: String,
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub auto_hide: bool,
}

/// What observers of the session see
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub loading: bool,
    pub online: bool,
    pub event: Option<SecurityEvent>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_accepts_numeric_and_string_ids() {
        let numeric: User = serde_json::from_value(json!({"id": 1, "email": "a@b.com"})).unwrap();
        assert_eq!(numeric.id, UserId::Numeric(1));
        assert_eq!(numeric.subscription_tier, "free");

        let telegram: User = serde_json::from_value(json!({
            "id": "tg_abc",
            "username": "satoshi",
            "telegram_id": 42
        }))
        .unwrap();
        assert_eq!(telegram.id, UserId::Text("tg_abc".to_string()));
        assert_eq!(telegram.display_name(), "satoshi");
        assert_eq!(telegram.extra.get("telegram_id"), Some(&json!(42)));
    }

    #[test]
    fn test_merge_updates_known_and_extra_fields() {
        let user: User = serde_json::from_value(json!({
            "id": 1,
            "email": "a@b.com",
            "subscription_tier": "free",
            "api_calls_count": 3,
            "daily_limit": 5
        }))
        .unwrap();

        let patch = json!({"subscription_tier": "pro", "plan_renews_at": "2026-11-01"});
        let merged = user.merged_with(patch.as_object().unwrap()).unwrap();

        assert_eq!(merged.subscription_tier, "pro");
        assert_eq!(merged.email.as_deref(), Some("a@b.com"));
        assert_eq!(merged.usage.api_calls_count, 3);
        assert_eq!(merged.usage.daily_limit, Some(5));
        assert!(!merged.extra.contains_key("api_calls_count"));
        assert_eq!(merged.extra.get("plan_renews_at"), Some(&json!("2026-11-01")));

        let broken = json!({"id": null});
        assert!(user.merged_with(broken.as_object().unwrap()).is_err());
    }
}
