/// Log tags identify which subsystem produced a message
///
/// Each tag maps to a `--debug-<key>` flag that unlocks its debug output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Session,
    Realtime,
    Api,
    Storage,
    Payments,
    Other(String),
}

impl LogTag {
    /// Key used by `--debug-<key>` / `--verbose-<key>` flags
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::System => "system".to_string(),
            LogTag::Config => "config".to_string(),
            LogTag::Session => "session".to_string(),
            LogTag::Realtime => "realtime".to_string(),
            LogTag::Api => "api".to_string(),
            LogTag::Storage => "storage".to_string(),
            LogTag::Payments => "payments".to_string(),
            LogTag::Other(s) => s.to_lowercase(),
        }
    }

    /// Uncolored label written to the log file
    pub fn to_plain_string(&self) -> String {
        match self {
            LogTag::Other(s) => s.to_uppercase(),
            tag => tag.to_debug_key().to_uppercase(),
        }
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}
