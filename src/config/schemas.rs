//! Configuration schemas - every section defined once with its defaults
//!
//! The TOML file mirrors this layout:
//!
//! ```toml
//! [api]
//! base_url = "https://api.cryptopilot.app"
//!
//! [realtime]
//! max_reconnect_attempts = 10
//! ```
use crate::config_struct;

// ============================================================================
// BACKEND ENDPOINTS
// ============================================================================

config_struct! {
    /// Backend HTTP and WebSocket addresses
    pub struct ApiConfig {
        /// Base URL for REST calls (auth, payments)
        base_url: String = "http://localhost:8000".to_string(),
        /// Base URL for realtime streams (ws:// or wss://)
        ws_base_url: String = "ws://localhost:8000".to_string(),
        /// Per-request timeout
        request_timeout_secs: u64 = 15,
        /// Timeout for the lightweight health probe
        health_timeout_secs: u64 = 5,
    }
}

// ============================================================================
// SESSION
// ============================================================================

config_struct! {
    /// Session manager timers
    pub struct SessionConfig {
        /// Periodic re-verification of the current user
        revalidate_interval_secs: u64 = 300,
        /// Rotate the access token this long before it expires
        token_refresh_margin_secs: u64 = 60,
        /// How long an error event stays visible
        error_hide_ms: u64 = 10_000,
        /// How long a warning event stays visible
        warning_hide_ms: u64 = 7_000,
        /// How long an info event stays visible
        info_hide_ms: u64 = 5_000,
    }
}

// ============================================================================
// REALTIME
// ============================================================================

config_struct! {
    /// Realtime channel reconnect policy
    pub struct RealtimeConfig {
        max_reconnect_attempts: u32 = 5,
        /// Fixed delay between a dropped connection and the next attempt
        reconnect_delay_ms: u64 = 3_000,
        /// Outbound frames buffered per connection
        outbound_buffer: usize = 64,
    }
}

// ============================================================================
// PAYMENTS
// ============================================================================

config_struct! {
    /// Crypto payment status polling
    pub struct PaymentsConfig {
        poll_interval_secs: u64 = 10,
        /// Upper bound on status polls before giving up (30 min at 10s)
        max_polls: u32 = 180,
    }
}

// ============================================================================
// STORAGE & LOGGING
// ============================================================================

config_struct! {
    /// Client-side persisted state
    pub struct StorageConfig {
        /// Session file; empty means <data dir>/cryptopilot/session.json
        path: String = String::new(),
    }
}

config_struct! {
    pub struct LoggingConfig {
        /// error, warning, info, debug or verbose
        level: String = "info".to_string(),
        file_enabled: bool = true,
    }
}

// ============================================================================
// ROOT
// ============================================================================

config_struct! {
    /// Root configuration
    pub struct Config {
        api: ApiConfig = ApiConfig::default(),
        session: SessionConfig = SessionConfig::default(),
        realtime: RealtimeConfig = RealtimeConfig::default(),
        payments: PaymentsConfig = PaymentsConfig::default(),
        storage: StorageConfig = StorageConfig::default(),
        logging: LoggingConfig = LoggingConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [api]
            base_url = "https://api.example.com"

            [realtime]
            max_reconnect_attempts = 2
            "#,
        )
        .unwrap();

        assert_eq!(cfg.api.base_url, "https://api.example.com");
        assert_eq!(cfg.api.ws_base_url, "ws://localhost:8000");
        assert_eq!(cfg.realtime.max_reconnect_attempts, 2);
        assert_eq!(cfg.realtime.reconnect_delay_ms, 3_000);
        assert_eq!(cfg.session, SessionConfig::default());
    }

    #[test]
    fn test_error_events_outlive_info_events() {
        let session = SessionConfig::default();
        assert!(session.error_hide_ms >= 2 * session.info_hide_ms);
    }
}
