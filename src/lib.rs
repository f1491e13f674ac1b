//! # sentinel-config
//!
//! Client for remote key-value configuration stores with sentinel-key change polling.
//!
//! ## Overview
//!
//! `sentinel-config` reads labeled settings from a remote store and keeps
//! subscribers up to date:
//! - Point reads of specific keys, or a paginated listing of the whole store
//! - Subscriptions that poll a cheap sentinel key and deliver their watched keys
//! - Disjoint key ownership: a key is watched by at most one subscription
//! - Handler errors and panics are contained and never stop polling
//! - Store properties layered from files, environment variables and code
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sentinel_config::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> sentinel_config::error::Result<()> {
//! let store = ConfigurationStore::builder()
//!     .with_host("https://store.example.com")
//!     .with_poll_interval(Duration::from_secs(10))
//!     .build()?;
//!
//! // Read two keys under the "prod" label
//! let items = store
//!     .get(GetRequest::new(["db.url", "db.pool"]).with_label("prod"))
//!     .await?;
//! println!("db.url = {}", items["db.url"].value());
//!
//! // Get both keys again whenever "sentinel" is polled
//! let id = store
//!     .subscribe(
//!         SubscribeRequest::new(["db.url", "db.pool"])
//!             .with_sentinel_key("sentinel")
//!             .with_label("prod"),
//!         |event: UpdateEvent| async move {
//!             for (key, item) in &event.items {
//!                 println!("{key} = {}", item.value());
//!             }
//!             Ok::<(), HandlerError>(())
//!         },
//!     )
//!     .await?;
//!
//! store.unsubscribe(&id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `http` (default): the REST backend built from the store properties
//! - `metrics`: OpenTelemetry metrics for poll loops
//!
//! Without `http`, a [`SettingsClient`](backend::SettingsClient) must be
//! injected through the builder.

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod backend;
pub mod core;
pub mod error;
pub mod notify;
pub mod sources;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{
        ConfigurationStore, ConfigurationStoreBuilder, GetRequest, Item, SubscribeRequest,
        SubscriptionId, UpdateEvent, Validate,
    };
    pub use crate::error::{ConfigError, HandlerError, Result, ValidationError};
    pub use crate::notify::{ChangeDetection, UpdateHandler};
}
