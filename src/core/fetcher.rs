//! Translates key requests into backend reads.

use crate::backend::{Setting, SettingSelector, SettingsClient, WILDCARD};
use crate::core::Item;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Fetches items from a [`SettingsClient`].
///
/// Requests for specific keys become one point read per key; a request for no
/// keys becomes a paginated listing of the whole store. Backend errors are
/// returned as-is and nothing is retried here.
#[derive(Clone)]
pub struct ItemFetcher {
    client: Arc<dyn SettingsClient>,
}

impl ItemFetcher {
    /// Create a fetcher over a backend client.
    pub fn new(client: Arc<dyn SettingsClient>) -> Self {
        Self { client }
    }

    /// Fetch the given keys, or every key when `keys` is empty.
    ///
    /// `label` scopes both point reads and the listing. Without a label, point
    /// reads address unlabeled settings and the listing matches every label.
    ///
    /// # Errors
    ///
    /// Returns the first backend error encountered; no partial result is returned.
    pub async fn fetch(&self, keys: &[String], label: Option<&str>) -> Result<HashMap<String, Item>> {
        if keys.is_empty() {
            return self.fetch_all(label).await;
        }

        let mut items = HashMap::with_capacity(keys.len());
        for key in keys {
            let setting = self.client.get_setting(key, label).await?;
            items.insert(key.clone(), into_item(setting).1);
        }

        Ok(items)
    }

    /// Fetch a single key.
    pub async fn fetch_one(&self, key: &str, label: Option<&str>) -> Result<Item> {
        let setting = self.client.get_setting(key, label).await?;
        Ok(into_item(setting).1)
    }

    async fn fetch_all(&self, label: Option<&str>) -> Result<HashMap<String, Item>> {
        let selector = SettingSelector::all_keys(label.unwrap_or(WILDCARD));
        let mut items = HashMap::new();
        let mut continuation: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .client
                .list_settings(&selector, continuation.as_deref())
                .await?;
            pages += 1;

            for setting in page.settings {
                let (key, item) = into_item(setting);
                items.insert(key, item);
            }

            match page.next_page {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        debug!(
            client = %self.client.name(),
            label = selector.label_filter.as_str(),
            pages,
            items = items.len(),
            "listed all settings"
        );

        Ok(items)
    }
}

fn into_item(setting: Setting) -> (String, Item) {
    let item = Item::new(setting.value.unwrap_or_default());
    let item = match setting.label {
        Some(label) => item.with_label(label),
        None => item,
    };
    (setting.key, item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryClient;
    use crate::error::ConfigError;

    fn fetcher(client: &InMemoryClient) -> ItemFetcher {
        ItemFetcher::new(Arc::new(client.clone()))
    }

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_fetch_specific_keys() {
        let client = InMemoryClient::new();
        client.set("a", "1", None);
        client.set("b", "2", None);
        client.set("c", "3", None);

        let items = fetcher(&client).fetch(&keys(&["a", "b"]), None).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items["a"].value(), "1");
        assert_eq!(items["b"].value(), "2");
        assert_eq!(items["a"].label(), None);
    }

    #[tokio::test]
    async fn test_fetch_with_label_records_label() {
        let client = InMemoryClient::new();
        client.set("a", "1", Some("prod"));

        let items = fetcher(&client)
            .fetch(&keys(&["a"]), Some("prod"))
            .await
            .unwrap();
        assert_eq!(items["a"].label(), Some("prod"));

        // Unlabeled read does not see the labeled setting.
        let err = fetcher(&client).fetch(&keys(&["a"]), None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_fails_fast() {
        let client = InMemoryClient::new();
        client.set("a", "1", None);
        client.set("c", "3", None);
        client.fail_key("b");

        let result = fetcher(&client).fetch(&keys(&["a", "b", "c"]), None).await;
        assert!(matches!(result, Err(ConfigError::Transport(_))));
        // "c" is never read after "b" fails.
        assert_eq!(client.read_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_all_paginates() {
        let client = InMemoryClient::new().with_page_size(3);
        for i in 0..10 {
            client.set(format!("key{i}"), i.to_string(), None);
        }

        let items = fetcher(&client).fetch(&[], None).await.unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(items["key7"].value(), "7");
        assert_eq!(client.read_count(), 4);
    }

    #[tokio::test]
    async fn test_fetch_all_listing_error_propagates() {
        let client = InMemoryClient::new();
        client.set("a", "1", None);
        client.fail_listing(true);

        let result = fetcher(&client).fetch(&[], None).await;
        assert!(matches!(result, Err(ConfigError::Transport(_))));
    }

    #[tokio::test]
    async fn test_fetch_one() {
        let client = InMemoryClient::new();
        client.set("sentinel", "v1", None);
        let item = fetcher(&client).fetch_one("sentinel", None).await.unwrap();
        assert_eq!(item.value(), "v1");
    }

    #[test]
    fn test_null_value_becomes_empty() {
        let (key, item) = into_item(Setting {
            key: "k".to_string(),
            value: None,
            label: None,
        });
        assert_eq!(key, "k");
        assert_eq!(item.value(), "");
    }
}
