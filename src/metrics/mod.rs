//! Built-in metrics for subscription polling.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Poll cycles and their duration
//! - Sentinel and key read failures
//! - Deliveries and handler failures
//! - Active subscriptions
//!
//! # Examples
//!
//! ```rust,no_run
//! use sentinel_config::prelude::*;
//! use opentelemetry::global;
//!
//! # fn example() -> Result<()> {
//! let meter = global::meter("my-app");
//!
//! let store = ConfigurationStore::builder()
//!     .with_host("https://store.example.com")
//!     .with_metrics(meter)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod subscription_metrics;

pub use subscription_metrics::SubscriptionMetrics;
