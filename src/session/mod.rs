/// Session management: who is logged in, and what they may see
///
/// - `types`: user record, credentials, auth results, security events
/// - `events`: the single security event slot with auto-hide timers
/// - `permissions`: permission and subscription tier checks
/// - `manager`: the `SessionManager` tying them to the backend
mod events;
mod manager;
pub mod permissions;
mod types;

pub use manager::SessionManager;
pub use permissions::TierLadder;
pub use types::{
    codes, AuthResult, Credentials, EventKind, PasswordCredentials, RegisterData, SecurityEvent,
    SessionSnapshot, TelegramAuthData, User, UserId, UsageCounters, WalletAuthData,
};
