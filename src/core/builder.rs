//! Builder for constructing ConfigurationStore instances.

use crate::backend::SettingsClient;
use crate::core::metadata::{
    CONNECTION_STRING, HOST, MAX_RETRIES, MAX_RETRY_DELAY, RETRY_DELAY, SUBSCRIBE_POLL_INTERVAL,
};
use crate::core::{ConfigurationStore, ItemFetcher, PropertiesLoader, StoreMetadata, Validate};
use crate::error::Result;
use crate::notify::ChangeDetection;
use crate::sources::{EnvSource, FileSource, PropertySource};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Builder for constructing a [`ConfigurationStore`].
///
/// Store properties are layered from property files, custom sources and
/// environment variables, in increasing priority. Properties set directly on the
/// builder override all of them.
///
/// # Examples
///
/// ```rust,no_run
/// use sentinel_config::prelude::*;
/// use std::time::Duration;
///
/// # fn example() -> Result<()> {
/// let store = ConfigurationStore::builder()
///     .with_file("config/store.yaml")
///     .with_env_overrides("APPCONFIG", "__")
///     .with_poll_interval(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ConfigurationStoreBuilder {
    properties: HashMap<String, String>,
    file_paths: Vec<PathBuf>,
    env_prefix: Option<String>,
    env_separator: Option<String>,
    custom_sources: Vec<Box<dyn PropertySource>>,
    client: Option<Arc<dyn SettingsClient>>,
    change_detection: ChangeDetection,
    #[cfg(feature = "http")]
    auth_token: Option<String>,
    #[cfg(feature = "metrics")]
    meter: Option<opentelemetry::metrics::Meter>,
}

impl ConfigurationStoreBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            properties: HashMap::new(),
            file_paths: Vec::new(),
            env_prefix: None,
            env_separator: None,
            custom_sources: Vec::new(),
            client: None,
            change_detection: ChangeDetection::default(),
            #[cfg(feature = "http")]
            auth_token: None,
            #[cfg(feature = "metrics")]
            meter: None,
        }
    }

    /// Set a store property by name, e.g. `subscribePollInterval`.
    ///
    /// Names are matched case-insensitively and an empty value counts as unset.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.properties
            .retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        self.properties.insert(name, value.into());
        self
    }

    /// Set several store properties.
    pub fn with_properties<I, K, V>(self, properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        properties
            .into_iter()
            .fold(self, |builder, (name, value)| builder.with_property(name, value))
    }

    /// Connect to the store at `host`.
    pub fn with_host(self, host: impl Into<String>) -> Self {
        self.with_property(HOST, host)
    }

    /// Connect with a connection string of the form `Endpoint=...;Id=...;Secret=...`.
    pub fn with_connection_string(self, connection_string: impl Into<String>) -> Self {
        self.with_property(CONNECTION_STRING, connection_string)
    }

    /// Number of retries for failed backend requests.
    pub fn with_max_retries(self, max_retries: u32) -> Self {
        self.with_property(MAX_RETRIES, max_retries.to_string())
    }

    /// Delay before the first retry; later retries back off exponentially.
    pub fn with_retry_delay(self, delay: Duration) -> Self {
        self.with_property(RETRY_DELAY, format_millis(delay))
    }

    /// Upper bound for the retry delay.
    pub fn with_max_retry_delay(self, delay: Duration) -> Self {
        self.with_property(MAX_RETRY_DELAY, format_millis(delay))
    }

    /// Default poll interval for subscriptions.
    pub fn with_poll_interval(self, interval: Duration) -> Self {
        self.with_property(SUBSCRIBE_POLL_INTERVAL, format_millis(interval))
    }

    /// Add a property file.
    ///
    /// Supported formats: YAML (.yaml, .yml), TOML (.toml), JSON (.json)
    ///
    /// Later files have higher priority and override earlier files.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_paths.push(path.into());
        self
    }

    /// Read properties from environment variables.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Prefix for environment variables (e.g., "APPCONFIG")
    /// * `separator` - Separator between prefix and property (e.g., "__")
    ///
    /// Environment variables have the highest priority among sources (300).
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.env_separator = Some(separator.to_string());
        self
    }

    /// Add a custom property source.
    pub fn with_source<S: PropertySource + 'static>(mut self, source: S) -> Self {
        self.custom_sources.push(Box::new(source));
        self
    }

    /// Use `client` instead of building an HTTP client from the properties.
    ///
    /// The connection properties are still required and validated.
    pub fn with_client<C: SettingsClient + 'static>(mut self, client: C) -> Self {
        self.client = Some(Arc::new(client));
        self
    }

    /// Use a shared client.
    pub fn with_shared_client(mut self, client: Arc<dyn SettingsClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Default change detection mode for subscriptions.
    pub fn with_change_detection(mut self, detection: ChangeDetection) -> Self {
        self.change_detection = detection;
        self
    }

    /// Bearer token sent when connecting through [`with_host`](Self::with_host).
    #[cfg(feature = "http")]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Record subscription metrics with `meter`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Build the store.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A property source fails to load
    /// - Both or neither of the host and connection string are set
    /// - A numeric or duration property cannot be parsed
    /// - The parsed settings fail validation
    /// - No client was injected and the `http` feature is disabled
    pub fn build(self) -> Result<ConfigurationStore> {
        let mut loader = PropertiesLoader::new();

        for (index, path) in self.file_paths.iter().enumerate() {
            let priority = 100 + (index as i32 * 10); // 100, 110, 120, etc.
            loader.add_source(Box::new(FileSource::new(path).with_priority(priority)));
        }

        for source in self.custom_sources {
            loader.add_source(source);
        }

        if let (Some(prefix), Some(separator)) = (self.env_prefix, self.env_separator) {
            loader.add_source(Box::new(EnvSource::new(prefix, separator)));
        }

        debug!(sources = ?loader.source_names(), "loading store properties");
        let mut properties = loader.load()?;
        for (name, value) in self.properties {
            properties.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
            properties.insert(name, value);
        }

        let metadata = StoreMetadata::from_properties(&properties)?;
        metadata.validate()?;

        let client: Arc<dyn SettingsClient> = match self.client {
            Some(client) => client,
            #[cfg(feature = "http")]
            None => Arc::new(crate::backend::HttpSettingsClient::from_metadata(
                &metadata,
                self.auth_token,
            )?),
            #[cfg(not(feature = "http"))]
            None => {
                return Err(crate::error::ConfigError::Configuration(
                    "no settings client provided and the http feature is disabled".to_string(),
                ));
            }
        };

        info!(
            client = %client.name(),
            poll_interval_ms = metadata.poll_interval.as_millis() as u64,
            max_retries = metadata.retry.max_retries,
            "configuration store ready"
        );

        let store = ConfigurationStore::new(metadata, ItemFetcher::new(client), self.change_detection);

        #[cfg(feature = "metrics")]
        let store = match self.meter {
            Some(meter) => store.with_metrics(crate::metrics::SubscriptionMetrics::new(meter)),
            None => store,
        };

        Ok(store)
    }
}

impl Default for ConfigurationStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationStore {
    /// Create a new builder for constructing a configuration store.
    pub fn builder() -> ConfigurationStoreBuilder {
        ConfigurationStoreBuilder::new()
    }
}

fn format_millis(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}
