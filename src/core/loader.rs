//! Property loader that merges multiple sources.

use crate::error::{ConfigError, Result};
use crate::sources::PropertySource;
use std::collections::HashMap;
use tracing::debug;

/// Loads and merges store properties from multiple sources.
///
/// Sources are sorted by priority and merged in order (lower priority first,
/// higher priority sources override). Every merged value must be a scalar; it
/// is converted to its string form for [`StoreMetadata::from_properties`].
///
/// [`StoreMetadata::from_properties`]: crate::core::StoreMetadata::from_properties
pub(crate) struct PropertiesLoader {
    sources: Vec<Box<dyn PropertySource>>,
}

impl PropertiesLoader {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn add_source(&mut self, source: Box<dyn PropertySource>) {
        self.sources.push(source);
    }

    /// Load and merge properties from all sources.
    ///
    /// No sources yields an empty map.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Any source fails to load
    /// - A merged value is a table or an array
    pub fn load(&self) -> Result<HashMap<String, String>> {
        if self.sources.is_empty() {
            return Ok(HashMap::new());
        }

        let mut sorted_sources: Vec<_> = self.sources.iter().collect();
        sorted_sources.sort_by_key(|s| s.priority());

        let mut builder = config::Config::builder();

        for source in sorted_sources {
            let values = source.load().map_err(|e| {
                ConfigError::LoadError(format!("Failed to load source '{}': {}", source.name(), e))
            })?;
            debug!(source = %source.name(), properties = values.len(), "loaded property source");

            for (key, value) in values {
                builder = builder.set_override(&key, value).map_err(|e| {
                    ConfigError::LoadError(format!(
                        "Failed to merge source '{}': {}",
                        source.name(),
                        e
                    ))
                })?;
            }
        }

        let merged = builder
            .build()
            .map_err(|e| ConfigError::LoadError(format!("Failed to build properties: {}", e)))?
            .try_deserialize::<HashMap<String, config::Value>>()
            .map_err(|e| {
                ConfigError::DeserializationError(format!("Failed to read properties: {}", e))
            })?;

        merged
            .into_iter()
            .map(|(key, value)| {
                let value = value.into_string().map_err(|e| {
                    ConfigError::DeserializationError(format!(
                        "Property '{}' must be a plain value: {}",
                        key, e
                    ))
                })?;
                Ok((key, value))
            })
            .collect()
    }

    /// Get the list of source names in priority order.
    pub fn source_names(&self) -> Vec<String> {
        let mut sorted_sources: Vec<_> = self.sources.iter().collect();
        sorted_sources.sort_by_key(|s| s.priority());
        sorted_sources.iter().map(|s| s.name()).collect()
    }
}

impl Default for PropertiesLoader {
    fn default() -> Self {
        Self::new()
    }
}
