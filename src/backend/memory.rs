//! In-process settings backend.

use super::{Setting, SettingSelector, SettingsClient, SettingsPage, filter_matches};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

type SettingKey = (String, Option<String>);

#[derive(Default)]
struct Inner {
    settings: BTreeMap<SettingKey, String>,
    failing_keys: HashSet<String>,
    failing_listing: bool,
}

/// Settings backend held entirely in memory.
///
/// Settings are indexed by `(key, label)`. Listings are returned in key order in
/// pages of [`page_size`](InMemoryClient::with_page_size) entries. Reads of
/// specific keys and listings can be made to fail, which makes the client usable
/// as a stand-in for an unreliable remote store.
///
/// Clones share the same settings.
///
/// # Examples
///
/// ```rust
/// use sentinel_config::backend::InMemoryClient;
///
/// let client = InMemoryClient::new();
/// client.set("db.url", "postgres://localhost/app", Some("prod"));
/// client.set("sentinel", "1", None);
/// assert_eq!(client.len(), 2);
/// ```
#[derive(Clone)]
pub struct InMemoryClient {
    inner: Arc<RwLock<Inner>>,
    page_size: usize,
    reads: Arc<AtomicU64>,
}

impl InMemoryClient {
    /// Create an empty backend with a page size of 100.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            page_size: 100,
            reads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Set the number of settings returned per listing page (minimum 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Insert or replace a setting.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, label: Option<&str>) {
        self.inner
            .write()
            .settings
            .insert((key.into(), label.map(str::to_string)), value.into());
    }

    /// Remove a setting. Returns whether it existed.
    pub fn remove(&self, key: &str, label: Option<&str>) -> bool {
        self.inner
            .write()
            .settings
            .remove(&(key.to_string(), label.map(str::to_string)))
            .is_some()
    }

    /// Make point reads of `key` fail with a transport error.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.inner.write().failing_keys.insert(key.into());
    }

    /// Make point reads of `key` succeed again.
    pub fn restore_key(&self, key: &str) {
        self.inner.write().failing_keys.remove(key);
    }

    /// Make listings fail (or succeed again) with a transport error.
    pub fn fail_listing(&self, failing: bool) {
        self.inner.write().failing_listing = failing;
    }

    /// Number of stored settings.
    pub fn len(&self) -> usize {
        self.inner.read().settings.len()
    }

    /// Whether no settings are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of point reads and listing pages served or refused.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettingsClient for InMemoryClient {
    async fn get_setting(&self, key: &str, label: Option<&str>) -> Result<Setting> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.read();

        if inner.failing_keys.contains(key) {
            return Err(ConfigError::Transport(format!(
                "simulated read failure for key '{}'",
                key
            )));
        }

        inner
            .settings
            .get(&(key.to_string(), label.map(str::to_string)))
            .map(|value| Setting::new(key, value.clone(), label))
            .ok_or_else(|| ConfigError::NotFound {
                key: key.to_string(),
                label: label.map(str::to_string),
            })
    }

    async fn list_settings(
        &self,
        selector: &SettingSelector,
        continuation: Option<&str>,
    ) -> Result<SettingsPage> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.read();

        if inner.failing_listing {
            return Err(ConfigError::Transport(
                "simulated listing failure".to_string(),
            ));
        }

        let offset = match continuation {
            Some(token) => token.parse::<usize>().map_err(|e| {
                ConfigError::Transport(format!("Invalid continuation token '{}': {}", token, e))
            })?,
            None => 0,
        };

        let matching: Vec<Setting> = inner
            .settings
            .iter()
            .filter(|((key, label), _)| {
                filter_matches(&selector.key_filter, key)
                    && filter_matches(&selector.label_filter, label.as_deref().unwrap_or(""))
            })
            .map(|((key, label), value)| Setting::new(key.clone(), value.clone(), label.as_deref()))
            .collect();

        let end = (offset + self.page_size).min(matching.len());
        let settings = matching.get(offset..end).map(<[Setting]>::to_vec).unwrap_or_default();
        let next_page = (end < matching.len()).then(|| end.to_string());

        Ok(SettingsPage {
            settings,
            next_page,
        })
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_setting_by_label() {
        let client = InMemoryClient::new();
        client.set("a", "prod-value", Some("prod"));
        client.set("a", "plain-value", None);

        let setting = client.get_setting("a", Some("prod")).await.unwrap();
        assert_eq!(setting.value.as_deref(), Some("prod-value"));
        assert_eq!(setting.label.as_deref(), Some("prod"));

        let setting = client.get_setting("a", None).await.unwrap();
        assert_eq!(setting.value.as_deref(), Some("plain-value"));
        assert_eq!(setting.label, None);
    }

    #[tokio::test]
    async fn test_get_missing_setting() {
        let client = InMemoryClient::new();
        let err = client.get_setting("missing", None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_failing_key() {
        let client = InMemoryClient::new();
        client.set("a", "1", None);
        client.fail_key("a");
        assert!(matches!(
            client.get_setting("a", None).await,
            Err(ConfigError::Transport(_))
        ));

        client.restore_key("a");
        assert!(client.get_setting("a", None).await.is_ok());
        assert_eq!(client.read_count(), 2);
    }

    #[tokio::test]
    async fn test_listing_pages() {
        let client = InMemoryClient::new().with_page_size(2);
        for key in ["a", "b", "c", "d", "e"] {
            client.set(key, "v", None);
        }

        let selector = SettingSelector::all_keys("*");
        let first = client.list_settings(&selector, None).await.unwrap();
        assert_eq!(first.settings.len(), 2);
        assert_eq!(first.next_page.as_deref(), Some("2"));

        let second = client.list_settings(&selector, Some("2")).await.unwrap();
        let third = client.list_settings(&selector, Some("4")).await.unwrap();
        assert_eq!(second.settings[0].key, "c");
        assert_eq!(third.settings.len(), 1);
        assert!(third.next_page.is_none());
    }

    #[tokio::test]
    async fn test_listing_label_filter() {
        let client = InMemoryClient::new();
        client.set("x", "1", Some("prod"));
        client.set("z", "3", Some("dev"));

        let page = client
            .list_settings(&SettingSelector::all_keys("prod"), None)
            .await
            .unwrap();
        assert_eq!(page.settings.len(), 1);
        assert_eq!(page.settings[0].key, "x");
    }

    #[tokio::test]
    async fn test_failing_listing() {
        let client = InMemoryClient::new();
        client.fail_listing(true);
        assert!(
            client
                .list_settings(&SettingSelector::all_keys("*"), None)
                .await
                .is_err()
        );
    }
}
