//! Change notification through sentinel-key polling.
//!
//! Subscriptions own disjoint sets of keys tracked by a [`SubscriptionRegistry`].
//! Each one runs a [`PollLoop`] that watches a sentinel key and delivers the
//! subscription's keys to an [`UpdateHandler`]. The [`SubscriptionManager`]
//! starts and stops them.

mod handler;
pub mod lifecycle;
pub mod poll_loop;
pub mod registry;

pub use handler::UpdateHandler;
pub use lifecycle::SubscriptionManager;
pub use poll_loop::{ChangeDetection, PollLoop, PollSettings, PollState, StopReason};
pub use registry::SubscriptionRegistry;
