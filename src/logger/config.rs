/// Logger configuration and per-tag debug switches
///
/// Populated once from the command line by `init_from_args`, then read on
/// every log call. Tests and embedders can replace it with `set_logger_config`.
use super::levels::LogLevel;
use super::tags::LogTag;
use crate::arguments::{get_cmd_args, is_quiet_enabled, is_verbose_enabled};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Highest level that is printed
    pub min_level: LogLevel,
    /// Tags with debug output unlocked
    pub debug_tags: HashSet<String>,
    /// Tags with verbose output unlocked
    pub verbose_tags: HashSet<String>,
    /// If non-empty, only these tags are printed (errors always are)
    pub enabled_tags: HashSet<String>,
    /// Console output switch (file output is unaffected)
    pub console_enabled: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
            verbose_tags: HashSet::new(),
            enabled_tags: HashSet::new(),
            console_enabled: true,
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

/// Get a copy of the current logger configuration
pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG.read().clone()
}

/// Replace the logger configuration
pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write() = config;
}

/// Mutate the logger configuration in place
pub fn update_logger_config<F: FnOnce(&mut LoggerConfig)>(f: F) {
    f(&mut LOGGER_CONFIG.write());
}

/// Build the configuration from `--debug-<tag>`, `--verbose-<tag>`,
/// `--verbose` and `--quiet`
pub fn init_from_args() {
    let args = get_cmd_args();
    let mut config = LoggerConfig::default();

    for arg in &args {
        if let Some(tag) = arg.strip_prefix("--debug-") {
            config.debug_tags.insert(tag.to_lowercase());
        } else if let Some(tag) = arg.strip_prefix("--verbose-") {
            config.verbose_tags.insert(tag.to_lowercase());
        }
    }

    if is_verbose_enabled() {
        config.min_level = LogLevel::Verbose;
    } else if !config.debug_tags.is_empty() {
        config.min_level = LogLevel::Debug;
    } else if is_quiet_enabled() {
        config.min_level = LogLevel::Warning;
    }

    set_logger_config(config);
}

/// Apply the `[logging]` section of the TOML config
pub fn apply_level_name(level: &str) {
    if let Some(level) = LogLevel::from_str(level) {
        update_logger_config(|cfg| {
            // Command line flags win over the file
            if cfg.min_level == LogLevel::Info && cfg.debug_tags.is_empty() {
                cfg.min_level = level;
            }
        });
    }
}

pub fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    LOGGER_CONFIG.read().debug_tags.contains(&tag.to_debug_key())
}

pub fn is_verbose_enabled_for_tag(tag: &LogTag) -> bool {
    LOGGER_CONFIG.read().verbose_tags.contains(&tag.to_debug_key())
}
