//! Configuration utilities - loading, reloading, and access helpers
//!
//! The global CONFIG is what the binaries read. Library types never reach
//! for it on their own: `SessionManager` and `RealtimeChannel` take their
//! sections by value so tests can hand in whatever they need.
use super::schemas::Config;
use crate::errors::ClientError;
use crate::logger::{self, LogTag};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};

/// Global configuration instance
pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

/// Default configuration file name inside the app data directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// <config dir>/cryptopilot/config.toml
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cryptopilot").join(CONFIG_FILE_NAME))
}

/// Parse a config file, falling back to defaults if it does not exist
pub fn read_config_file(path: &Path) -> Result<Config, ClientError> {
    if !path.exists() {
        logger::warning(
            LogTag::Config,
            &format!("Config file '{}' not found, using default values", path.display()),
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| {
        ClientError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
    })?;

    toml::from_str::<Config>(&contents).map_err(|e| {
        ClientError::Config(format!("Failed to parse config file '{}': {}", path.display(), e))
    })
}

/// Load configuration from `path` and install it as the global CONFIG
///
/// Calling it again replaces the active configuration (hot reload).
pub fn load_config_from_path(path: &Path) -> Result<(), ClientError> {
    let config = read_config_file(path)?;
    logger::apply_level_name(&config.logging.level);

    if let Some(lock) = CONFIG.get() {
        *lock.write() = config;
        return Ok(());
    }

    if CONFIG.set(RwLock::new(config.clone())).is_err() {
        // Lost an init race; overwrite what the winner stored
        if let Some(lock) = CONFIG.get() {
            *lock.write() = config;
        }
    }

    Ok(())
}

/// Execute a function with read access to the configuration
///
/// Falls back to the built-in defaults when nothing was loaded.
///
/// # Example
/// ```
/// use cryptopilot::config::with_config;
///
/// let attempts = with_config(|cfg| cfg.realtime.max_reconnect_attempts);
/// assert!(attempts > 0);
/// ```
pub fn with_config<F, R>(f: F) -> R
where
    F: FnOnce(&Config) -> R,
{
    let lock = CONFIG.get_or_init(|| RwLock::new(Config::default()));
    let config = lock.read();
    f(&config)
}

/// Get a clone of the entire configuration
///
/// Useful when config values must be held across await points.
pub fn get_config_clone() -> Config {
    with_config(|cfg| cfg.clone())
}

/// Write the active configuration to `path`
pub fn save_config(path: &Path) -> Result<(), ClientError> {
    let contents = with_config(|cfg| toml::to_string_pretty(cfg))
        .map_err(|e| ClientError::Config(format!("Failed to serialize config: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = read_config_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[realtime\nmax_reconnect_attempts = ").unwrap();

        match read_config_file(&path) {
            Err(ClientError::Config(msg)) => assert!(msg.contains("Failed to parse")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_saved_config_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        save_config(&path).unwrap();
        let cfg = read_config_file(&path).unwrap();

        assert_eq!(cfg, get_config_clone());
    }
}
