//! Subscription metrics tracking using OpenTelemetry.

use crate::notify::poll_loop::CycleOutcome;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector for subscription poll loops.
///
/// Clones share the same instruments, so one collector can be handed to every
/// poll loop of a store.
///
/// # Examples
///
/// ```rust,no_run
/// use sentinel_config::metrics::SubscriptionMetrics;
/// use opentelemetry::global;
///
/// let meter = global::meter("sentinel-config");
/// let metrics = SubscriptionMetrics::new(meter);
/// metrics.update_active_subscriptions(3);
/// ```
#[derive(Clone)]
pub struct SubscriptionMetrics {
    poll_cycles: Counter<u64>,
    cycle_duration: Histogram<f64>,
    sentinel_failures: Counter<u64>,
    fetch_failures: Counter<u64>,
    deliveries: Counter<u64>,
    handler_failures: Counter<u64>,
    active_subscriptions: Gauge<i64>,
    delivery_age_seconds: Gauge<i64>,
    last_delivery: Arc<parking_lot::Mutex<Instant>>,
}

impl SubscriptionMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let poll_cycles = meter
            .u64_counter("sentinel_config.poll.cycles")
            .with_description("Total number of poll cycles run")
            .build();

        let cycle_duration = meter
            .f64_histogram("sentinel_config.poll.duration")
            .with_description("Duration of poll cycles, handler included, in seconds")
            .with_unit("s")
            .build();

        let sentinel_failures = meter
            .u64_counter("sentinel_config.sentinel.failures")
            .with_description("Number of cycles skipped because the sentinel could not be read")
            .build();

        let fetch_failures = meter
            .u64_counter("sentinel_config.fetch.failures")
            .with_description("Number of cycles skipped because watched keys could not be read")
            .build();

        let deliveries = meter
            .u64_counter("sentinel_config.deliveries")
            .with_description("Number of update events delivered to handlers")
            .build();

        let handler_failures = meter
            .u64_counter("sentinel_config.handler.failures")
            .with_description("Number of handler invocations that failed or panicked")
            .build();

        let active_subscriptions = meter
            .i64_gauge("sentinel_config.subscriptions.active")
            .with_description("Number of active subscriptions")
            .build();

        let delivery_age_seconds = meter
            .i64_gauge("sentinel_config.delivery.age")
            .with_description("Time since the last update event was delivered in seconds")
            .with_unit("s")
            .build();

        Self {
            poll_cycles,
            cycle_duration,
            sentinel_failures,
            fetch_failures,
            deliveries,
            handler_failures,
            active_subscriptions,
            delivery_age_seconds,
            last_delivery: Arc::new(parking_lot::Mutex::new(Instant::now())),
        }
    }

    /// Record a finished poll cycle that started at `start`.
    pub(crate) fn record_cycle(&self, outcome: CycleOutcome, start: Instant) {
        self.poll_cycles.add(1, &[]);
        self.cycle_duration
            .record(start.elapsed().as_secs_f64(), &[]);

        match outcome {
            CycleOutcome::Delivered => {
                self.deliveries.add(1, &[]);
                *self.last_delivery.lock() = Instant::now();
            }
            CycleOutcome::HandlerFailed => {
                self.deliveries.add(1, &[]);
                self.handler_failures.add(1, &[]);
                *self.last_delivery.lock() = Instant::now();
            }
            CycleOutcome::SentinelUnavailable => self.sentinel_failures.add(1, &[]),
            CycleOutcome::FetchFailed => self.fetch_failures.add(1, &[]),
            CycleOutcome::Unchanged => {}
        }
    }

    /// Update the number of active subscriptions.
    pub fn update_active_subscriptions(&self, count: i64) {
        self.active_subscriptions.record(count, &[]);
    }

    /// Update the time-since-last-delivery metric.
    ///
    /// This should be called periodically to track how stale handlers' views are.
    pub fn update_delivery_age(&self) {
        let age_secs = self.last_delivery.lock().elapsed().as_secs() as i64;
        self.delivery_age_seconds.record(age_secs, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::global;

    #[test]
    fn test_metrics_creation() {
        let metrics = SubscriptionMetrics::new(global::meter("test"));

        // Recording against the no-op global provider must not panic
        for outcome in [
            CycleOutcome::Delivered,
            CycleOutcome::HandlerFailed,
            CycleOutcome::Unchanged,
            CycleOutcome::SentinelUnavailable,
            CycleOutcome::FetchFailed,
        ] {
            metrics.record_cycle(outcome, Instant::now());
        }
        metrics.update_active_subscriptions(2);
        metrics.update_delivery_age();
    }

    #[test]
    fn test_delivery_resets_age() {
        let metrics = SubscriptionMetrics::new(global::meter("test"));
        let before = *metrics.last_delivery.lock();

        metrics.record_cycle(CycleOutcome::SentinelUnavailable, Instant::now());
        assert_eq!(*metrics.last_delivery.lock(), before);

        metrics.record_cycle(CycleOutcome::Delivered, Instant::now());
        assert!(*metrics.last_delivery.lock() >= before);
    }

    #[test]
    fn test_clones_share_state() {
        let metrics = SubscriptionMetrics::new(global::meter("test"));
        let clone = metrics.clone();
        clone.record_cycle(CycleOutcome::Delivered, Instant::now());
        assert!(Arc::ptr_eq(&metrics.last_delivery, &clone.last_delivery));
    }
}
