//! Creation and teardown of subscriptions.

use super::handler::UpdateHandler;
use super::poll_loop::{ChangeDetection, PollLoop, PollSettings, PollState};
use super::registry::SubscriptionRegistry;
use crate::core::{ItemFetcher, SubscribeRequest, SubscriptionId};
use crate::error::{ConfigError, Result, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[cfg(feature = "metrics")]
use crate::metrics::SubscriptionMetrics;

/// A live subscription as seen by the manager.
struct ActiveSubscription {
    stop: CancellationToken,
    state: watch::Receiver<PollState>,
}

/// Creates, tracks and tears down subscriptions.
///
/// Each subscription gets a stop token derived from the manager's shutdown
/// token, its own reserved keys and its own [`PollLoop`] task. Unsubscribing,
/// the loop exiting on its own and [`shutdown`](Self::shutdown) may race freely:
/// the stop token is taken out of the active table exactly once and releasing
/// keys that are already released does nothing.
///
/// Clones share the same subscriptions.
#[derive(Clone)]
pub struct SubscriptionManager {
    registry: Arc<SubscriptionRegistry>,
    active: Arc<RwLock<HashMap<SubscriptionId, ActiveSubscription>>>,
    fetcher: ItemFetcher,
    default_interval: Duration,
    default_detection: ChangeDetection,
    shutdown: CancellationToken,
    #[cfg(feature = "metrics")]
    metrics: Option<SubscriptionMetrics>,
}

impl SubscriptionManager {
    /// Create a manager polling through `fetcher`.
    pub fn new(
        fetcher: ItemFetcher,
        default_interval: Duration,
        default_detection: ChangeDetection,
    ) -> Self {
        Self {
            registry: Arc::new(SubscriptionRegistry::new()),
            active: Arc::new(RwLock::new(HashMap::new())),
            fetcher,
            default_interval,
            default_detection,
            shutdown: CancellationToken::new(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Record poll cycles and subscription counts into `metrics`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: SubscriptionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The key ownership registry.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Start a subscription.
    ///
    /// The loop runs until [`unsubscribe`](Self::unsubscribe), until `context` is
    /// cancelled, or until the manager shuts down.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingSentinelKey`] if the request has no sentinel key
    /// - [`ConfigError::NoKeysRequested`] if the request has no keys
    /// - [`ConfigError::AllKeysSubscribed`] if every key is already watched
    /// - [`ConfigError::Configuration`] if the request overrides the poll interval with zero
    /// - [`ConfigError::Closed`] after [`shutdown`](Self::shutdown)
    ///
    /// No keys are reserved and no task is started when an error is returned.
    pub async fn subscribe(
        &self,
        request: SubscribeRequest,
        handler: Arc<dyn UpdateHandler>,
        context: CancellationToken,
    ) -> Result<SubscriptionId> {
        if self.shutdown.is_cancelled() {
            return Err(ConfigError::Closed);
        }

        let sentinel_key = request
            .sentinel_key()
            .ok_or(ConfigError::MissingSentinelKey)?
            .to_string();
        if request.keys.is_empty() {
            return Err(ConfigError::NoKeysRequested);
        }
        let interval = request.poll_interval.unwrap_or(self.default_interval);
        if interval.is_zero() {
            return Err(ValidationError::invalid_field(
                "pollInterval",
                "must be greater than zero",
            )
            .into());
        }

        let id = SubscriptionId::generate();
        let keys = self.registry.reserve(&id, &request.keys).await;
        if keys.is_empty() {
            return Err(ConfigError::AllKeysSubscribed);
        }
        if keys.len() < request.keys.len() {
            debug!(
                subscription_id = %id,
                requested = request.keys.len(),
                reserved = keys.len(),
                "some keys are already watched by other subscriptions"
            );
        }

        let settings = PollSettings {
            sentinel_key,
            label: request.label().map(str::to_string),
            interval,
            change_detection: request.change_detection.unwrap_or(self.default_detection),
        };
        let stop = self.shutdown.child_token();

        let poll = PollLoop::new(
            id.clone(),
            keys.clone(),
            settings,
            self.fetcher.clone(),
            handler,
            stop.clone(),
            context,
        );
        #[cfg(feature = "metrics")]
        let poll = match &self.metrics {
            Some(metrics) => poll.with_metrics(metrics.clone()),
            None => poll,
        };

        {
            let mut active = self.active.write().await;
            active.insert(
                id.clone(),
                ActiveSubscription {
                    stop,
                    state: poll.state(),
                },
            );
            #[cfg(feature = "metrics")]
            self.record_active(active.len());
        }

        info!(subscription_id = %id, keys = ?keys, "subscribed");

        let manager = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            let reason = poll.run().await;
            if manager.retire(&task_id).await {
                debug!(subscription_id = %task_id, ?reason, "subscription ended by its context");
            }
        });

        Ok(id)
    }

    /// Stop a subscription and release its keys.
    ///
    /// Unknown or already removed identifiers are ignored.
    pub async fn unsubscribe(&self, id: &SubscriptionId) -> Result<()> {
        if self.retire(id).await {
            info!(subscription_id = %id, "unsubscribed");
        }
        Ok(())
    }

    /// Stop every subscription and release every key.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let ids: Vec<SubscriptionId> = self.active.read().await.keys().cloned().collect();
        for id in &ids {
            self.retire(id).await;
        }

        if !ids.is_empty() {
            info!(subscriptions = ids.len(), "all subscriptions stopped");
        }
    }

    /// Cancel the stop tokens of every subscription without waiting.
    pub(crate) fn cancel_all(&self) {
        self.shutdown.cancel();
    }

    /// Number of live subscriptions.
    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// State of a live subscription's poll loop.
    pub async fn state_of(&self, id: &SubscriptionId) -> Option<PollState> {
        self.active
            .read()
            .await
            .get(id)
            .map(|subscription| *subscription.state.borrow())
    }

    /// Remove `id` from the active table, signal its loop and release its keys.
    ///
    /// Returns whether the subscription was still active.
    async fn retire(&self, id: &SubscriptionId) -> bool {
        let removed = {
            let mut active = self.active.write().await;
            let removed = active.remove(id);
            #[cfg(feature = "metrics")]
            self.record_active(active.len());
            removed
        };

        let Some(subscription) = removed else {
            return false;
        };

        subscription.stop.cancel();
        let released = self.registry.release(id).await;
        debug!(subscription_id = %id, released = ?released, "released subscription keys");

        true
    }

    #[cfg(feature = "metrics")]
    fn record_active(&self, count: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.update_active_subscriptions(count as i64);
        }
    }
}
