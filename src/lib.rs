//! CryptoPilot client core
//!
//! Session management (authentication state, token verification, security
//! events) and realtime channels (one WebSocket per stream with bounded
//! reconnect) for the CryptoPilot trading assistant.

pub mod api;
pub mod arguments;
pub mod config;
pub mod errors;
pub mod logger;
pub mod payments;
pub mod realtime;
pub mod session;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;
