//! Key ownership bookkeeping for subscriptions.

use crate::core::SubscriptionId;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Internal registry state. Both maps are only ever changed together.
#[derive(Default)]
struct RegistryInner {
    /// key -> owning subscription
    owners: HashMap<String, SubscriptionId>,
    /// subscription -> keys it owns
    keys: HashMap<SubscriptionId, Vec<String>>,
}

/// Registry mapping watched keys to the subscription that owns them.
///
/// A key is owned by at most one subscription at a time. `reserve` and `release`
/// each run as a single critical section, so concurrent lifecycles never observe
/// or produce a half-updated pair of maps.
///
/// # Examples
///
/// ```rust
/// use sentinel_config::core::SubscriptionId;
/// use sentinel_config::notify::SubscriptionRegistry;
///
/// # async fn example() {
/// let registry = SubscriptionRegistry::new();
/// let first = SubscriptionId::generate();
/// let second = SubscriptionId::generate();
///
/// let keys = vec!["a".to_string(), "b".to_string()];
/// assert_eq!(registry.reserve(&first, &keys).await.len(), 2);
///
/// // "b" is taken, so only "c" is reserved for the second subscription.
/// let keys = vec!["b".to_string(), "c".to_string()];
/// assert_eq!(registry.reserve(&second, &keys).await, vec!["c".to_string()]);
///
/// registry.release(&first).await;
/// assert_eq!(registry.owner_of("b").await, None);
/// # }
/// ```
pub struct SubscriptionRegistry {
    inner: RwLock<RegistryInner>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Claim every requested key that no subscription owns yet.
    ///
    /// Keys already owned, by another subscription or earlier in the same
    /// request, are skipped. Claimed keys are appended to `id`'s key list, which
    /// is only created when at least one key was claimed.
    ///
    /// Returns the keys actually claimed, in request order.
    pub async fn reserve(&self, id: &SubscriptionId, requested: &[String]) -> Vec<String> {
        let mut inner = self.inner.write().await;

        let mut reserved = Vec::new();
        for key in requested {
            if inner.owners.contains_key(key) {
                continue;
            }
            inner.owners.insert(key.clone(), id.clone());
            reserved.push(key.clone());
        }

        if !reserved.is_empty() {
            inner
                .keys
                .entry(id.clone())
                .or_default()
                .extend(reserved.iter().cloned());
        }

        reserved
    }

    /// Release every key owned by `id`.
    ///
    /// Returns the released keys; releasing an unknown subscription is a no-op
    /// and returns nothing.
    pub async fn release(&self, id: &SubscriptionId) -> Vec<String> {
        let mut inner = self.inner.write().await;

        let keys = inner.keys.remove(id).unwrap_or_default();
        for key in &keys {
            inner.owners.remove(key);
        }

        keys
    }

    /// The subscription currently owning `key`.
    pub async fn owner_of(&self, key: &str) -> Option<SubscriptionId> {
        self.inner.read().await.owners.get(key).cloned()
    }

    /// The keys owned by `id`.
    pub async fn keys_of(&self, id: &SubscriptionId) -> Vec<String> {
        self.inner
            .read()
            .await
            .keys
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of subscriptions owning at least one key.
    pub async fn subscription_count(&self) -> usize {
        self.inner.read().await.keys.len()
    }

    /// Number of keys currently owned.
    pub async fn watched_key_count(&self) -> usize {
        self.inner.read().await.owners.len()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    /// Both directions of the mapping agree.
    async fn assert_consistent(registry: &SubscriptionRegistry) {
        let inner = registry.inner.read().await;
        for (key, owner) in &inner.owners {
            assert!(inner.keys[owner].contains(key));
        }
        let listed: usize = inner.keys.values().map(Vec::len).sum();
        assert_eq!(listed, inner.owners.len());
        for (id, owned) in &inner.keys {
            assert!(!owned.is_empty());
            for key in owned {
                assert_eq!(inner.owners.get(key), Some(id));
            }
        }
    }

    #[tokio::test]
    async fn test_reserve_and_release() {
        let registry = SubscriptionRegistry::new();
        let id = SubscriptionId::generate();

        let reserved = registry.reserve(&id, &keys(&["a", "b"])).await;
        assert_eq!(reserved, keys(&["a", "b"]));
        assert_eq!(registry.owner_of("a").await, Some(id.clone()));
        assert_eq!(registry.subscription_count().await, 1);
        assert_eq!(registry.watched_key_count().await, 2);

        let released = registry.release(&id).await;
        assert_eq!(released, keys(&["a", "b"]));
        assert_eq!(registry.owner_of("a").await, None);
        assert_eq!(registry.subscription_count().await, 0);
        assert_consistent(&registry).await;
    }

    #[tokio::test]
    async fn test_overlapping_keys_skipped() {
        let registry = SubscriptionRegistry::new();
        let first = SubscriptionId::generate();
        let second = SubscriptionId::generate();

        registry.reserve(&first, &keys(&["a", "b"])).await;
        let reserved = registry.reserve(&second, &keys(&["b", "c"])).await;

        assert_eq!(reserved, keys(&["c"]));
        assert_eq!(registry.owner_of("b").await, Some(first.clone()));
        assert_eq!(registry.keys_of(&second).await, keys(&["c"]));
        assert_consistent(&registry).await;
    }

    #[tokio::test]
    async fn test_fully_owned_request_creates_no_entry() {
        let registry = SubscriptionRegistry::new();
        let first = SubscriptionId::generate();
        let second = SubscriptionId::generate();

        registry.reserve(&first, &keys(&["a"])).await;
        assert!(registry.reserve(&second, &keys(&["a"])).await.is_empty());
        assert_eq!(registry.subscription_count().await, 1);
        assert!(registry.keys_of(&second).await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_keys_in_request() {
        let registry = SubscriptionRegistry::new();
        let id = SubscriptionId::generate();

        let reserved = registry.reserve(&id, &keys(&["a", "a", "b"])).await;
        assert_eq!(reserved, keys(&["a", "b"]));
        assert_consistent(&registry).await;
    }

    #[tokio::test]
    async fn test_reserve_appends_for_same_id() {
        let registry = SubscriptionRegistry::new();
        let id = SubscriptionId::generate();

        registry.reserve(&id, &keys(&["a"])).await;
        registry.reserve(&id, &keys(&["a", "b"])).await;
        assert_eq!(registry.keys_of(&id).await, keys(&["a", "b"]));
    }

    #[tokio::test]
    async fn test_release_unknown_is_noop() {
        let registry = SubscriptionRegistry::new();
        let id = SubscriptionId::generate();
        registry.reserve(&id, &keys(&["a"])).await;

        assert!(registry.release(&SubscriptionId::from("unknown")).await.is_empty());
        assert_eq!(registry.owner_of("a").await, Some(id.clone()));

        registry.release(&id).await;
        assert!(registry.release(&id).await.is_empty());
    }

    #[tokio::test]
    async fn test_released_keys_reservable_again() {
        let registry = SubscriptionRegistry::new();
        let first = SubscriptionId::generate();
        let second = SubscriptionId::generate();

        registry.reserve(&first, &keys(&["a"])).await;
        registry.release(&first).await;
        assert_eq!(registry.reserve(&second, &keys(&["a"])).await, keys(&["a"]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reserve_no_double_ownership() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let requested = keys(&["a", "b", "c", "d", "e", "f"]);

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let requested = requested.clone();
            tasks.push(tokio::spawn(async move {
                let id = SubscriptionId::generate();
                registry.reserve(&id, &requested).await
            }));
        }

        let mut total = 0;
        for task in tasks {
            total += task.await.unwrap().len();
        }

        assert_eq!(total, requested.len());
        assert_consistent(&registry).await;
    }

    fn key_set() -> impl Strategy<Value = BTreeSet<String>> {
        proptest::collection::btree_set("[a-f]", 1..6)
    }

    proptest! {
        #[test]
        fn prop_intersection_owned_by_first(k1 in key_set(), k2 in key_set()) {
            tokio_test::block_on(async {
                let registry = SubscriptionRegistry::new();
                let first = SubscriptionId::generate();
                let second = SubscriptionId::generate();

                let k1_vec: Vec<String> = k1.iter().cloned().collect();
                let k2_vec: Vec<String> = k2.iter().cloned().collect();

                registry.reserve(&first, &k1_vec).await;
                let reserved: BTreeSet<String> =
                    registry.reserve(&second, &k2_vec).await.into_iter().collect();

                let expected: BTreeSet<String> = k2.difference(&k1).cloned().collect();
                assert_eq!(reserved, expected);

                for key in k1.intersection(&k2) {
                    assert_eq!(registry.owner_of(key).await, Some(first.clone()));
                }
                assert_consistent(&registry).await;
            });
        }

        #[test]
        fn prop_release_restores_other_subscription(k1 in key_set(), k2 in key_set()) {
            tokio_test::block_on(async {
                let registry = SubscriptionRegistry::new();
                let first = SubscriptionId::generate();
                let second = SubscriptionId::generate();

                let k1_vec: Vec<String> = k1.iter().cloned().collect();
                let k2_vec: Vec<String> = k2.iter().cloned().collect();

                registry.reserve(&first, &k1_vec).await;
                let second_keys = registry.reserve(&second, &k2_vec).await;
                registry.release(&first).await;
                registry.release(&first).await;

                assert_eq!(registry.keys_of(&second).await, second_keys);
                assert_eq!(registry.watched_key_count().await, second_keys.len());
                assert_consistent(&registry).await;
            });
        }
    }
}
