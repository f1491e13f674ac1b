//! Backend client capability and implementations.
//!
//! The store never talks to the remote service directly. Everything it needs is
//! a point read and a paginated listing, expressed by [`SettingsClient`].

mod memory;

#[cfg(feature = "http")]
mod http;

pub use memory::InMemoryClient;

#[cfg(feature = "http")]
pub use http::{HttpAuth, HttpSettingsClient, HttpSettingsClientBuilder};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Filter value matching every key or every label.
pub const WILDCARD: &str = "*";

/// A single setting as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    /// The setting key
    pub key: String,
    /// The setting value; the backend may report none
    #[serde(default)]
    pub value: Option<String>,
    /// The label the setting is stored under
    #[serde(default)]
    pub label: Option<String>,
}

impl Setting {
    /// Create a setting.
    pub fn new(key: impl Into<String>, value: impl Into<String>, label: Option<&str>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            label: label.map(str::to_string),
        }
    }
}

/// Key and label filters for a listing.
///
/// A filter of `*` matches everything; a filter ending in `*` matches by prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingSelector {
    /// Key filter
    pub key_filter: String,
    /// Label filter
    pub label_filter: String,
}

impl SettingSelector {
    /// Select every key under the given label filter.
    pub fn all_keys(label_filter: impl Into<String>) -> Self {
        Self {
            key_filter: WILDCARD.to_string(),
            label_filter: label_filter.into(),
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct SettingsPage {
    /// Settings on this page
    pub settings: Vec<Setting>,
    /// Continuation token for the next page, absent on the last page
    pub next_page: Option<String>,
}

/// Read capability of a remote configuration store.
///
/// Implementations own transport concerns: connection setup, authentication,
/// timeouts and retries.
#[async_trait]
pub trait SettingsClient: Send + Sync {
    /// Read a single setting.
    ///
    /// `label` of `None` addresses the setting stored without a label.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`](crate::error::ConfigError::NotFound) when
    /// no such setting exists and a transport error when the read fails.
    async fn get_setting(&self, key: &str, label: Option<&str>) -> Result<Setting>;

    /// Read one page of a listing.
    ///
    /// Pass `None` as `continuation` for the first page and the previous page's
    /// [`SettingsPage::next_page`] afterwards.
    async fn list_settings(
        &self,
        selector: &SettingSelector,
        continuation: Option<&str>,
    ) -> Result<SettingsPage>;

    /// Get a human-readable name for this client (for logging/debugging).
    fn name(&self) -> String;
}

/// Match a value against a `*` / `prefix*` / exact filter.
pub(crate) fn filter_matches(filter: &str, value: &str) -> bool {
    match filter.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => filter == value,
    }
}
