/// Error types for the CryptoPilot client core
///
/// Two layers:
/// - `ApiError` is what the HTTP capability hands back. It keeps the HTTP
///   status (or `None` for network-level failures) so callers can classify.
/// - `ClientError` is the library error for operations that can fail
///   outright (configuration, storage, realtime connect).
///
/// Expected auth failures are never errors; they come back as `AuthResult`.
use thiserror::Error;

// =============================================================================
// API ERROR (transport capability)
// =============================================================================

/// Failure reported by an `AuthApi` / `PaymentApi` call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", describe(.status, .message))]
pub struct ApiError {
    /// HTTP status, `None` when the request never got a response
    pub status: Option<u16>,
    /// `detail` / `error` field of the error body, or a transport message
    pub message: String,
    /// Backend asked for a second factor (202 or `X-MFA-Required`)
    pub mfa_required: bool,
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            mfa_required: false,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            mfa_required: false,
        }
    }

    pub fn mfa_required(message: impl Into<String>) -> Self {
        Self {
            status: Some(202),
            message: message.into(),
            mfa_required: true,
        }
    }

    /// No HTTP status: DNS, refused connection, timeout
    pub fn is_network(&self) -> bool {
        self.status.is_none()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == Some(429)
    }

    pub fn is_account_locked(&self) -> bool {
        self.status == Some(423)
    }

    pub fn is_mfa_required(&self) -> bool {
        self.mfa_required || self.message.to_lowercase().contains("mfa code required")
    }
}

fn describe(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("HTTP {}: {}", status, message),
        None => format!("Network error: {}", message),
    }
}

// =============================================================================
// CLIENT ERROR
// =============================================================================

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("No auth token available")]
    MissingToken,

    #[error("Max reconnection attempts ({attempts}) reached")]
    ReconnectExhausted { attempts: u32 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Worth retrying later without user action
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<ApiError> for ClientError {
    fn from(err: ApiError) -> Self {
        match err.status {
            Some(status) => ClientError::Http {
                status,
                message: err.message,
            },
            None => ClientError::Network(err.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_classification() {
        assert!(ApiError::network("connection refused").is_network());
        assert!(ApiError::http(429, "slow down").is_rate_limited());
        assert!(ApiError::http(423, "locked").is_account_locked());
        assert!(ApiError::http(401, "nope").is_unauthorized());
        assert!(ApiError::mfa_required("MFA code required").is_mfa_required());
        assert!(ApiError::http(400, "MFA code required").is_mfa_required());
        assert!(!ApiError::http(500, "boom").is_mfa_required());

        assert_eq!(ApiError::http(423, "locked").to_string(), "HTTP 423: locked");
        assert_eq!(
            ApiError::network("connection refused").to_string(),
            "Network error: connection refused"
        );
    }

    #[test]
    fn test_client_error_from_api_error() {
        let err: ClientError = ApiError::http(503, "maintenance").into();
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "HTTP 503: maintenance");

        let err: ClientError = ApiError::network("timed out").into();
        assert!(matches!(err, ClientError::Network(_)));
        assert!(!ClientError::MissingToken.is_recoverable());
    }
}
