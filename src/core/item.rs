//! Items, update events and request types exchanged with the store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::notify::ChangeDetection;

/// Request metadata key carrying the label filter.
pub const LABEL_METADATA: &str = "label";

/// Request metadata key carrying the sentinel key of a subscription.
pub const SENTINEL_KEY_METADATA: &str = "sentinelKey";

/// A configuration value together with its metadata.
///
/// Items are produced by the store and never modified afterwards. The label the
/// backend reported for the setting, if any, is available under the `label`
/// metadata key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    value: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl Item {
    /// Create an item with no metadata.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach the backend label to this item.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.metadata.insert(LABEL_METADATA.to_string(), label.into());
        self
    }

    /// The configuration value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// All metadata attached to this item.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// The label the setting was stored under, if any.
    pub fn label(&self) -> Option<&str> {
        self.metadata.get(LABEL_METADATA).map(String::as_str)
    }
}

/// Opaque identifier of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Generate a fresh, unique identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SubscriptionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SubscriptionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for SubscriptionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Event handed to a subscription handler once per detected change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    /// The subscription this event belongs to.
    pub id: SubscriptionId,
    /// Current values of the subscription's watched keys.
    pub items: HashMap<String, Item>,
}

/// Request for a point or bulk read.
///
/// An empty key list reads every key in the store.
///
/// # Examples
///
/// ```rust
/// use sentinel_config::core::GetRequest;
///
/// let request = GetRequest::new(["db.url", "db.pool"]).with_label("prod");
/// assert_eq!(request.label(), Some("prod"));
///
/// let everything = GetRequest::all();
/// assert!(everything.keys.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    /// Keys to read; empty means all keys.
    pub keys: Vec<String>,
    /// Request metadata (`label`).
    pub metadata: HashMap<String, String>,
}

impl GetRequest {
    /// Read the given keys.
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            metadata: HashMap::new(),
        }
    }

    /// Read every key in the store.
    pub fn all() -> Self {
        Self::default()
    }

    /// Scope the read to a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.metadata.insert(LABEL_METADATA.to_string(), label.into());
        self
    }

    /// The label filter, if one is set and non-empty.
    pub fn label(&self) -> Option<&str> {
        non_empty(&self.metadata, LABEL_METADATA)
    }
}

/// Request to watch a set of keys through a sentinel key.
///
/// # Examples
///
/// ```rust
/// use sentinel_config::core::SubscribeRequest;
/// use std::time::Duration;
///
/// let request = SubscribeRequest::new(["feature.a", "feature.b"])
///     .with_sentinel_key("sentinel")
///     .with_poll_interval(Duration::from_secs(5));
/// assert_eq!(request.sentinel_key(), Some("sentinel"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SubscribeRequest {
    /// Keys to watch.
    pub keys: Vec<String>,
    /// Request metadata (`label`, `sentinelKey`).
    pub metadata: HashMap<String, String>,
    /// Poll interval override; the store default applies when unset.
    pub poll_interval: Option<Duration>,
    /// Change detection override; the store default applies when unset.
    pub change_detection: Option<ChangeDetection>,
}

impl SubscribeRequest {
    /// Watch the given keys.
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the sentinel key polled to detect changes.
    pub fn with_sentinel_key(mut self, key: impl Into<String>) -> Self {
        self.metadata
            .insert(SENTINEL_KEY_METADATA.to_string(), key.into());
        self
    }

    /// Scope sentinel and key reads to a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.metadata.insert(LABEL_METADATA.to_string(), label.into());
        self
    }

    /// Override the store's poll interval for this subscription.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Override the store's change detection for this subscription.
    pub fn with_change_detection(mut self, detection: ChangeDetection) -> Self {
        self.change_detection = Some(detection);
        self
    }

    /// The sentinel key, if one is set and non-empty.
    pub fn sentinel_key(&self) -> Option<&str> {
        non_empty(&self.metadata, SENTINEL_KEY_METADATA)
    }

    /// The label filter, if one is set and non-empty.
    pub fn label(&self) -> Option<&str> {
        non_empty(&self.metadata, LABEL_METADATA)
    }
}

fn non_empty<'a>(metadata: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    metadata
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}
