//! Environment variable property source.

use super::PropertySource;
use crate::error::{ConfigError, Result};
use config::Environment;
use std::collections::HashMap;

/// Environment variable property source.
///
/// Reads every variable starting with the prefix and strips it, so with prefix
/// `APPCONFIG` the variable `APPCONFIG_SUBSCRIBEPOLLINTERVAL=5s` sets the
/// `subscribePollInterval` property. Property names are matched
/// case-insensitively, so the case of the variable name does not matter.
///
/// # Examples
///
/// ```rust
/// use sentinel_config::sources::EnvSource;
///
/// // APPCONFIG_APPCONFIGHOST=https://store.example.com -> appConfigHost
/// let source = EnvSource::new("APPCONFIG", "__");
/// ```
pub struct EnvSource {
    prefix: String,
    separator: String,
    priority: i32,
}

impl EnvSource {
    /// Create a new environment variable source.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Prefix for environment variables (e.g., "APPCONFIG")
    /// * `separator` - Separator between the prefix and the property name (e.g., "__")
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            separator: separator.into(),
            priority: 300,
        }
    }

    /// Set the priority for this source.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for EnvSource {
    fn load(&self) -> Result<HashMap<String, config::Value>> {
        let variables = Environment::with_prefix(&self.prefix)
            .prefix_separator(&self.separator)
            .try_parsing(true);

        config::Config::builder()
            .add_source(variables)
            .build()
            .and_then(|parsed| parsed.try_deserialize::<HashMap<String, config::Value>>())
            .map_err(|e| {
                ConfigError::LoadError(format!(
                    "Failed to read {}{}* environment variables: {}",
                    self.prefix, self.separator, e
                ))
            })
    }

    fn name(&self) -> String {
        format!("env:{}*", self.prefix)
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
