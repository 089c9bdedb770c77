/// Configuration system
///
/// - `macros`: the `config_struct!` macro (sections with embedded defaults)
/// - `schemas`: every configuration section
/// - `utils`: loading, hot reload and global access
pub mod macros;
pub mod schemas;
pub mod utils;

pub use schemas::{
    ApiConfig, Config, LoggingConfig, PaymentsConfig, RealtimeConfig, SessionConfig,
    StorageConfig,
};
pub use utils::{
    default_config_path, get_config_clone, load_config_from_path, read_config_file, save_config,
    with_config, CONFIG, CONFIG_FILE_NAME,
};
