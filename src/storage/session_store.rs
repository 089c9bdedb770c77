use super::{KeyValueStore, TokenSource};
use crate::errors::ClientError;
use crate::logger::{self, LogTag};
use crate::session::User;
use std::sync::Arc;

pub const TOKEN_KEY: &str = "auth_token";
pub const USER_KEY: &str = "user";

/// Typed access to the persisted session keys
///
/// Reads are public; writes are crate-private and only the session manager
/// calls them.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn token(&self) -> Option<String> {
        self.backend.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Cached user record; a record that no longer parses is discarded
    pub fn cached_user(&self) -> Option<User> {
        let raw = self.backend.get(USER_KEY)?;
        match serde_json::from_str::<User>(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                logger::warning(
                    LogTag::Storage,
                    &format!("Discarding unreadable cached user: {}", e),
                );
                let _ = self.backend.remove(USER_KEY);
                None
            }
        }
    }

    pub(crate) fn set_token(&self, token: &str) -> Result<(), ClientError> {
        self.backend.set(TOKEN_KEY, token)
    }

    pub(crate) fn cache_user(&self, user: &User) -> Result<(), ClientError> {
        let raw = serde_json::to_string(user)?;
        self.backend.set(USER_KEY, &raw)
    }

    pub(crate) fn clear_user(&self) -> Result<(), ClientError> {
        self.backend.remove(USER_KEY)
    }

    /// Drop both the token and the cached user
    pub(crate) fn clear(&self) -> Result<(), ClientError> {
        let token = self.backend.remove(TOKEN_KEY);
        let user = self.backend.remove(USER_KEY);
        token.and(user)
    }
}

impl TokenSource for SessionStore {
    fn access_token(&self) -> Option<String> {
        self.token()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("has_token", &self.token().is_some())
            .finish()
    }
}
