/// Centralized argument handling for CryptoPilot
///
/// The logger and the binaries read debug switches from here instead of
/// re-parsing `env::args()` in every module.
///
/// Features:
/// - Global CMD_ARGS storage with thread-safe access
/// - Per-module debug flag checks (`--debug-<module>`)
/// - Small parsing helpers shared by the binaries
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::env;

/// Global command-line arguments storage
/// Binaries and tests can override it with `set_cmd_args`
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Sets the global command-line arguments
pub fn set_cmd_args(args: Vec<String>) {
    *CMD_ARGS.lock() = args;
}

/// Gets a copy of the current command-line arguments
pub fn get_cmd_args() -> Vec<String> {
    CMD_ARGS.lock().clone()
}

/// Checks if a specific argument is present in the command line
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

/// Gets the value that follows a flag, if any
pub fn get_arg_value(flag: &str) -> Option<String> {
    let args = get_cmd_args();
    for (i, arg) in args.iter().enumerate() {
        if arg == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

// =============================================================================
// DEBUG FLAG CHECKING FUNCTIONS
// =============================================================================

/// Session manager debug mode
pub fn is_debug_session_enabled() -> bool {
    has_arg("--debug-session")
}

/// Realtime channel debug mode
pub fn is_debug_realtime_enabled() -> bool {
    has_arg("--debug-realtime")
}

/// HTTP API debug mode
pub fn is_debug_api_enabled() -> bool {
    has_arg("--debug-api")
}

/// Local storage debug mode
pub fn is_debug_storage_enabled() -> bool {
    has_arg("--debug-storage")
}

/// Payments debug mode
pub fn is_debug_payments_enabled() -> bool {
    has_arg("--debug-payments")
}

/// System operations debug mode
pub fn is_debug_system_enabled() -> bool {
    has_arg("--debug-system")
}

/// Verbose logging for every tag
pub fn is_verbose_enabled() -> bool {
    has_arg("--verbose") || has_arg("-v")
}

/// Quiet mode - only warnings and errors reach the console
pub fn is_quiet_enabled() -> bool {
    has_arg("--quiet") || has_arg("-q")
}

/// Gets a list of all enabled debug modes
pub fn get_enabled_debug_modes() -> Vec<&'static str> {
    let checks: [(&'static str, fn() -> bool); 6] = [
        ("session", is_debug_session_enabled),
        ("realtime", is_debug_realtime_enabled),
        ("api", is_debug_api_enabled),
        ("storage", is_debug_storage_enabled),
        ("payments", is_debug_payments_enabled),
        ("system", is_debug_system_enabled),
    ];

    checks
        .iter()
        .filter(|(_, enabled)| enabled())
        .map(|(name, _)| *name)
        .collect()
}

/// Checks if any debug mode is enabled
pub fn is_any_debug_enabled() -> bool {
    !get_enabled_debug_modes().is_empty()
}

/// Logs which debug modes are active (startup banner)
pub fn print_debug_info() {
    let modes = get_enabled_debug_modes();
    if !modes.is_empty() {
        crate::logger::info(
            crate::logger::LogTag::System,
            &format!("Debug modes enabled: {}", modes.join(", ")),
        );
    }
}

/// Whether `arg` is consumed by the logger rather than a command parser
pub fn is_logging_flag(arg: &str) -> bool {
    arg.starts_with("--debug-")
        || arg.starts_with("--verbose")
        || arg == "-v"
        || arg == "--quiet"
        || arg == "-q"
}

/// Common argument parsing patterns used across binaries
pub mod patterns {
    use super::*;

    /// Arguments with logging flags removed, for handing to clap
    pub fn without_logging_flags() -> Vec<String> {
        get_cmd_args()
            .into_iter()
            .filter(|arg| !is_logging_flag(arg))
            .collect()
    }

    /// Gets duration argument (used by the monitoring tools)
    pub fn get_duration_seconds() -> Option<u64> {
        get_arg_value("--duration").and_then(|s| s.parse().ok())
    }

    /// Gets the stream argument (portfolio, market, signals, prices)
    pub fn get_stream() -> Option<String> {
        get_arg_value("--stream")
    }

    /// Gets the comma separated symbol list for the price stream
    pub fn get_symbols() -> Vec<String> {
        get_arg_value("--symbols")
            .map(|s| {
                s.split(',')
                    .map(|sym| sym.trim().to_uppercase())
                    .filter(|sym| !sym.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test mutates the global args so parallel tests never race on it.
    #[test]
    fn test_args_and_debug_flags() {
        set_cmd_args(vec![
            "cryptopilot".to_string(),
            "--debug-session".to_string(),
            "--debug-realtime".to_string(),
            "--stream".to_string(),
            "prices".to_string(),
            "--symbols".to_string(),
            "btc, eth,,sol".to_string(),
        ]);

        assert!(has_arg("--debug-session"));
        assert!(!has_arg("--debug-api"));
        assert_eq!(get_arg_value("--stream"), Some("prices".to_string()));
        assert_eq!(get_arg_value("--missing"), None);

        assert!(is_debug_session_enabled());
        assert!(is_debug_realtime_enabled());
        assert!(!is_debug_payments_enabled());
        assert!(is_any_debug_enabled());

        let modes = get_enabled_debug_modes();
        assert_eq!(modes, vec!["session", "realtime"]);

        assert_eq!(patterns::get_stream(), Some("prices".to_string()));
        assert_eq!(patterns::get_symbols(), vec!["BTC", "ETH", "SOL"]);
        assert_eq!(patterns::get_duration_seconds(), None);

        let remaining = patterns::without_logging_flags();
        assert_eq!(remaining[0], "cryptopilot");
        assert!(!remaining.iter().any(|a| a.starts_with("--debug-")));
        assert_eq!(remaining.len(), 5);
    }
}
