//! File-based property source.

use super::PropertySource;
use crate::error::{ConfigError, Result};
use config::{File, FileFormat};
use std::collections::HashMap;
use std::path::PathBuf;

/// File-based property source.
///
/// Reads a flat map of store properties from a YAML, TOML or JSON file, with the
/// format detected from the file extension.
///
/// # Examples
///
/// ```rust,no_run
/// use sentinel_config::sources::FileSource;
///
/// let source = FileSource::new("config/store.yaml");
/// ```
///
/// where `config/store.yaml` contains:
///
/// ```yaml
/// appConfigHost: https://store.example.com
/// subscribePollInterval: 10s
/// maxRetries: 5
/// ```
pub struct FileSource {
    path: PathBuf,
    priority: i32,
}

impl FileSource {
    /// Create a new file source.
    ///
    /// The format is detected from the file extension:
    /// - `.yaml`, `.yml` -> YAML
    /// - `.toml` -> TOML
    /// - `.json` -> JSON
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            priority: 100,
        }
    }

    /// Set the priority for this source.
    ///
    /// Higher priority sources override lower priority ones.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// The file format implied by the extension.
    fn format(&self) -> Result<FileFormat> {
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("yaml" | "yml") => Ok(FileFormat::Yaml),
            Some("toml") => Ok(FileFormat::Toml),
            Some("json") => Ok(FileFormat::Json),
            Some(other) => Err(ConfigError::LoadError(format!(
                "Unsupported property file extension '.{}' for {} (expected .yaml, .yml, .toml or .json)",
                other,
                self.path.display()
            ))),
            None => Err(ConfigError::LoadError(format!(
                "Property file {} has no extension",
                self.path.display()
            ))),
        }
    }
}

impl PropertySource for FileSource {
    fn load(&self) -> Result<HashMap<String, config::Value>> {
        let format = self.format()?;
        if !self.path.is_file() {
            return Err(ConfigError::LoadError(format!(
                "Property file not found: {}",
                self.path.display()
            )));
        }

        let path = self.path.to_string_lossy();
        config::Config::builder()
            .add_source(File::new(&path, format))
            .build()
            .and_then(|parsed| parsed.try_deserialize::<HashMap<String, config::Value>>())
            .map_err(|e| {
                ConfigError::DeserializationError(format!(
                    "Failed to read property file {}: {}",
                    self.path.display(),
                    e
                ))
            })
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
