//! Per-subscription polling of a sentinel key.

use super::handler::{UpdateHandler, dispatch};
use crate::core::{Item, ItemFetcher, SubscriptionId, UpdateEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[cfg(feature = "metrics")]
use crate::metrics::SubscriptionMetrics;

/// How a poll loop decides that the sentinel signals a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeDetection {
    /// Every successful sentinel read counts as a change, so watched keys are
    /// delivered on every cycle.
    #[default]
    Always,
    /// Only a sentinel whose value or metadata differs from the last delivered
    /// one counts as a change. The first successful read always delivers.
    SentinelValue,
}

/// Lifecycle state of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Polling on every interval.
    Running,
    /// A stop or cancellation was observed; no further cycle will start.
    Stopping,
    /// The loop has exited.
    Stopped,
}

/// Why a poll loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The subscription's own stop signal fired.
    Unsubscribed,
    /// The ambient cancellation context fired.
    ContextCancelled,
}

/// Result of a single poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    /// The handler received an event and returned successfully.
    Delivered,
    /// The handler received an event and failed or panicked.
    HandlerFailed,
    /// The sentinel was read but did not change.
    Unchanged,
    /// The sentinel could not be read.
    SentinelUnavailable,
    /// The watched keys could not be read.
    FetchFailed,
}

/// Polling parameters of one subscription.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Key polled to detect changes
    pub sentinel_key: String,
    /// Label scoping sentinel and key reads
    pub label: Option<String>,
    /// Time between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Change detection mode
    pub change_detection: ChangeDetection,
}

/// Background loop delivering updates for one subscription.
///
/// Each cycle reads the sentinel key, then the watched keys, then hands an
/// [`UpdateEvent`] to the handler. Read failures and handler faults are logged
/// and the loop carries on with the next cycle. Between cycles the loop waits
/// for the poll interval, its stop token or the ambient context, whichever
/// comes first. A cycle already in progress when a stop is requested is allowed
/// to finish.
pub struct PollLoop {
    id: SubscriptionId,
    keys: Vec<String>,
    settings: PollSettings,
    fetcher: ItemFetcher,
    handler: Arc<dyn UpdateHandler>,
    stop: CancellationToken,
    context: CancellationToken,
    state: watch::Sender<PollState>,
    last_sentinel: Option<Item>,
    #[cfg(feature = "metrics")]
    metrics: Option<SubscriptionMetrics>,
}

impl PollLoop {
    /// Create a loop in the `Running` state.
    pub fn new(
        id: SubscriptionId,
        keys: Vec<String>,
        settings: PollSettings,
        fetcher: ItemFetcher,
        handler: Arc<dyn UpdateHandler>,
        stop: CancellationToken,
        context: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(PollState::Running);
        Self {
            id,
            keys,
            settings,
            fetcher,
            handler,
            stop,
            context,
            state,
            last_sentinel: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Record cycle outcomes into `metrics`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: SubscriptionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Observe the loop's state.
    pub fn state(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    /// Run until the stop token or the context is cancelled.
    pub async fn run(mut self) -> StopReason {
        debug!(
            subscription_id = %self.id,
            keys = ?self.keys,
            sentinel_key = %self.settings.sentinel_key,
            interval_ms = self.settings.interval.as_millis() as u64,
            "poll loop running"
        );

        let reason = loop {
            self.poll_once().await;

            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break StopReason::Unsubscribed,
                _ = self.context.cancelled() => break StopReason::ContextCancelled,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        };

        self.transition(PollState::Stopping);
        debug!(subscription_id = %self.id, ?reason, "poll loop stopping");
        self.transition(PollState::Stopped);

        reason
    }

    /// Run one poll cycle.
    pub(crate) async fn poll_once(&mut self) -> CycleOutcome {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let outcome = self.cycle().await;

        #[cfg(feature = "metrics")]
        self.record(outcome, started);

        outcome
    }

    #[cfg(feature = "metrics")]
    fn record(&self, outcome: CycleOutcome, started: std::time::Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cycle(outcome, started);
        }
    }

    async fn cycle(&mut self) -> CycleOutcome {
        let label = self.settings.label.as_deref();

        let sentinel = match self
            .fetcher
            .fetch_one(&self.settings.sentinel_key, label)
            .await
        {
            Ok(item) => item,
            Err(e) => {
                debug!(
                    subscription_id = %self.id,
                    sentinel_key = %self.settings.sentinel_key,
                    error = %e,
                    "failed to read sentinel key, skipping cycle"
                );
                return CycleOutcome::SentinelUnavailable;
            }
        };

        if self.settings.change_detection == ChangeDetection::SentinelValue
            && self.last_sentinel.as_ref() == Some(&sentinel)
        {
            return CycleOutcome::Unchanged;
        }

        let items = match self.fetcher.fetch(&self.keys, label).await {
            Ok(items) => items,
            Err(e) => {
                error!(
                    subscription_id = %self.id,
                    error = %e,
                    "failed to read watched keys, skipping delivery"
                );
                return CycleOutcome::FetchFailed;
            }
        };

        let event = UpdateEvent {
            id: self.id.clone(),
            items,
        };
        let result = dispatch(self.handler.as_ref(), event).await;
        self.last_sentinel = Some(sentinel);

        match result {
            Ok(()) => CycleOutcome::Delivered,
            Err(e) => {
                error!(
                    subscription_id = %self.id,
                    error = %e,
                    "update handler failed"
                );
                CycleOutcome::HandlerFailed
            }
        }
    }

    fn transition(&self, next: PollState) {
        self.state.send_replace(next);
    }
}
