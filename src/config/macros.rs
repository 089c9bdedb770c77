/// Configuration macros for single-declaration config sections
///
/// `config_struct!` defines a section struct together with its defaults so
/// that a missing TOML key always falls back to the value written here.

/// Define a configuration struct with embedded defaults
///
/// Generates:
/// - The struct with public fields
/// - The Default implementation
/// - Serde support with `#[serde(default)]`
///
/// # Example
/// ```
/// cryptopilot::config_struct! {
///     pub struct ExampleSection {
///         max_reconnect_attempts: u32 = 5,
///         reconnect_delay_ms: u64 = 3000,
///     }
/// }
///
/// let section = ExampleSection::default();
/// assert_eq!(section.max_reconnect_attempts, 5);
/// ```
#[macro_export]
macro_rules! config_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_name:ident: $field_type:ty = $default_value:expr
            ),*
            $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field_name: $field_type,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $(
                        $field_name: $default_value,
                    )*
                }
            }
        }
    };
}
