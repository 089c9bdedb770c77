//! Structured logging for CryptoPilot
//!
//! This module provides a small, ergonomic logging API with:
//! - Automatic debug mode filtering from command-line arguments
//! - Standard log levels (Error/Warning/Info/Debug/Verbose)
//! - Per-module debug control via --debug-<module> flags
//! - Dual output: colored console + optional file persistence
//!
//! ## Usage
//!
//! ```rust
//! use cryptopilot::logger::{self, LogTag};
//!
//! logger::error(LogTag::Session, "Verification failed");
//! logger::warning(LogTag::Realtime, "Reconnect attempt 3/5");
//! logger::info(LogTag::Session, "User logged in");
//! logger::debug(LogTag::Api, "GET /api/auth/me"); // Only if --debug-api
//! logger::verbose(LogTag::Realtime, "Raw frame: ..."); // Only if --verbose
//! ```
//!
//! ## Initialization
//!
//! Call once at startup (in main.rs):
//! ```rust,no_run
//! cryptopilot::logger::init();
//! ```

mod config;
mod core;
mod file;
mod format;
mod levels;
mod tags;

pub use config::{
    apply_level_name, get_logger_config, init_from_args, set_logger_config,
    update_logger_config, LoggerConfig,
};
pub use file::{current_log_path, default_log_path, init_file_logging};
pub use levels::LogLevel;
pub use tags::LogTag;

/// Initialize the logger system
///
/// Reads debug flags from the command line and opens the default log file.
pub fn init() {
    init_console();
    enable_file_logging();
}

/// Console-only initialization; call `enable_file_logging` later if the
/// configuration asks for it
pub fn init_console() {
    config::init_from_args();
}

/// Open the default log file; failure only disables the file sink
pub fn enable_file_logging() {
    if let Some(path) = file::default_log_path() {
        if let Err(e) = file::init_file_logging(&path) {
            warning(
                LogTag::System,
                &format!("File logging disabled ({}): {}", path.display(), e),
            );
        }
    }
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level (shown unless --quiet raised the threshold)
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level
///
/// Debug logs are ONLY shown when the --debug-<module> flag for the tag is
/// provided, e.g. `--debug-realtime`.
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level (only with --verbose or --verbose-<module>)
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

/// Force flush all pending log writes
///
/// Call this during shutdown to ensure all logs are written to disk.
pub fn flush() {
    file::flush_file_logging();
}
