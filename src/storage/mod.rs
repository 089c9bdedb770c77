//! Client-side persisted state
//!
//! Browser `localStorage` becomes the `KeyValueStore` capability. The
//! `SessionStore` on top of it owns the two keys the session layer persists
//! (`auth_token`, `user`); only the session manager writes through it.

mod file;
mod memory;
mod session_store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use session_store::{SessionStore, TOKEN_KEY, USER_KEY};

use crate::errors::ClientError;

/// Synchronous string key-value storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;

    fn remove(&self, key: &str) -> Result<(), ClientError>;
}

/// Read-only view of the current access token
///
/// Realtime channels hold one of these instead of the session manager, so
/// they can attach the token but never change it.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
}
