/// Core logging implementation with automatic filtering
///
/// This module decides whether a message is shown and hands it to the
/// format module for output.
use super::config::{get_logger_config, is_debug_enabled_for_tag, is_verbose_enabled_for_tag};
use super::levels::LogLevel;
use super::tags::LogTag;

/// Check if a log message should be displayed
///
/// Filtering rules:
/// 1. Errors are always shown
/// 2. Check against minimum log level threshold
/// 3. Debug level requires --debug-<module> flag for that tag
/// 4. Verbose level requires --verbose flag OR --verbose-<module> flag for that tag
/// 5. If enabled_tags is non-empty, tag must be in the set
pub fn should_log(tag: &LogTag, level: LogLevel) -> bool {
    let config = get_logger_config();

    if level == LogLevel::Error {
        return true;
    }

    if level == LogLevel::Debug {
        return is_debug_enabled_for_tag(tag) || config.min_level == LogLevel::Verbose;
    }

    if level == LogLevel::Verbose {
        return config.min_level == LogLevel::Verbose || is_verbose_enabled_for_tag(tag);
    }

    if level > config.min_level {
        return false;
    }

    if !config.enabled_tags.is_empty() && !config.enabled_tags.contains(&tag.to_debug_key()) {
        return false;
    }

    true
}

/// Internal logging function with automatic filtering
pub fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    if !should_log(&tag, level) {
        return;
    }

    super::format::format_and_log(tag, level.as_str(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::config::{set_logger_config, LoggerConfig};
    use std::collections::HashSet;

    #[test]
    fn test_filtering_rules() {
        let mut debug_tags = HashSet::new();
        debug_tags.insert("realtime".to_string());
        set_logger_config(LoggerConfig {
            min_level: LogLevel::Warning,
            debug_tags,
            ..LoggerConfig::default()
        });

        assert!(should_log(&LogTag::Session, LogLevel::Error));
        assert!(should_log(&LogTag::Session, LogLevel::Warning));
        assert!(!should_log(&LogTag::Session, LogLevel::Info));
        assert!(should_log(&LogTag::Realtime, LogLevel::Debug));
        assert!(!should_log(&LogTag::Session, LogLevel::Debug));
        assert!(!should_log(&LogTag::Realtime, LogLevel::Verbose));

        set_logger_config(LoggerConfig::default());
    }
}
