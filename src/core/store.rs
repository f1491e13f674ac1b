//! The configuration store.

use crate::core::{GetRequest, Item, ItemFetcher, StoreMetadata, SubscribeRequest, SubscriptionId};
use crate::error::Result;
use crate::notify::{ChangeDetection, PollState, SubscriptionManager, UpdateHandler};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Client-side view of a remote key-value configuration store.
///
/// Reads go straight to the backend through [`get`](Self::get). Subscriptions
/// poll a sentinel key and deliver their watched keys to a handler until they
/// are unsubscribed, their context is cancelled, or the store is closed or
/// dropped.
///
/// # Examples
///
/// ```rust,no_run
/// use sentinel_config::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let store = ConfigurationStore::builder()
///     .with_host("https://store.example.com")
///     .build()?;
///
/// let items = store.get(GetRequest::new(["feature.flags"])).await?;
///
/// let id = store
///     .subscribe(
///         SubscribeRequest::new(["feature.flags"]).with_sentinel_key("sentinel"),
///         |event: UpdateEvent| async move {
///             println!("{} keys updated", event.items.len());
///             Ok::<(), HandlerError>(())
///         },
///     )
///     .await?;
///
/// store.unsubscribe(&id).await?;
/// # Ok(())
/// # }
/// ```
pub struct ConfigurationStore {
    metadata: StoreMetadata,
    fetcher: ItemFetcher,
    subscriptions: SubscriptionManager,
}

impl ConfigurationStore {
    pub(crate) fn new(
        metadata: StoreMetadata,
        fetcher: ItemFetcher,
        change_detection: ChangeDetection,
    ) -> Self {
        let subscriptions =
            SubscriptionManager::new(fetcher.clone(), metadata.poll_interval, change_detection);
        Self {
            metadata,
            fetcher,
            subscriptions,
        }
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn with_metrics(mut self, metrics: crate::metrics::SubscriptionMetrics) -> Self {
        self.subscriptions = self.subscriptions.clone().with_metrics(metrics);
        self
    }

    /// Read items from the store.
    ///
    /// With keys, each key is read under the request's label (or unlabeled when
    /// there is none). Without keys, every setting is listed, restricted to the
    /// request's label when one is given.
    ///
    /// # Errors
    ///
    /// Returns the first backend error; a missing key is reported as
    /// [`ConfigError::NotFound`](crate::error::ConfigError::NotFound).
    pub async fn get(&self, request: GetRequest) -> Result<HashMap<String, Item>> {
        let items = self.fetcher.fetch(&request.keys, request.label()).await?;
        debug!(requested = request.keys.len(), returned = items.len(), "get completed");
        Ok(items)
    }

    /// Subscribe to changes of the request's keys.
    ///
    /// Keys already watched by another subscription are left out; the rest are
    /// polled every [`poll_interval`](Self::poll_interval) unless the request
    /// overrides it.
    ///
    /// # Errors
    ///
    /// Fails without starting anything if the request has no sentinel key, has
    /// no keys, or all of its keys are already watched.
    pub async fn subscribe<H: UpdateHandler>(
        &self,
        request: SubscribeRequest,
        handler: H,
    ) -> Result<SubscriptionId> {
        self.subscriptions
            .subscribe(request, Arc::new(handler), CancellationToken::new())
            .await
    }

    /// Like [`subscribe`](Self::subscribe), also stopping when `context` is cancelled.
    ///
    /// A subscription stopped by its context releases its keys on its own.
    pub async fn subscribe_with_context<H: UpdateHandler>(
        &self,
        request: SubscribeRequest,
        handler: H,
        context: &CancellationToken,
    ) -> Result<SubscriptionId> {
        self.subscriptions
            .subscribe(request, Arc::new(handler), context.clone())
            .await
    }

    /// Stop a subscription and release its keys.
    ///
    /// Unsubscribing an unknown or already stopped subscription succeeds.
    pub async fn unsubscribe(&self, id: &SubscriptionId) -> Result<()> {
        self.subscriptions.unsubscribe(id).await
    }

    /// Stop every subscription and release every key.
    ///
    /// Later calls to [`subscribe`](Self::subscribe) fail with [`ConfigError::Closed`].
    pub async fn close(&self) {
        self.subscriptions.shutdown().await;
    }

    /// Number of live subscriptions.
    pub async fn active_subscriptions(&self) -> usize {
        self.subscriptions.active_count().await
    }

    /// State of a live subscription's poll loop.
    pub async fn subscription_state(&self, id: &SubscriptionId) -> Option<PollState> {
        self.subscriptions.state_of(id).await
    }

    /// The subscription currently watching `key`.
    pub async fn watcher_of(&self, key: &str) -> Option<SubscriptionId> {
        self.subscriptions.registry().owner_of(key).await
    }

    /// The parsed store metadata.
    pub fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }

    /// Default poll interval for new subscriptions.
    pub fn poll_interval(&self) -> Duration {
        self.metadata.poll_interval
    }
}

impl Drop for ConfigurationStore {
    fn drop(&mut self) {
        self.subscriptions.cancel_all();
    }
}
