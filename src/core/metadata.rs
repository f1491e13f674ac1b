//! Store metadata parsed from string properties.

use crate::core::Validate;
use crate::error::{Result, ValidationError};
use std::collections::HashMap;
use std::time::Duration;

/// Property naming the store endpoint.
pub const HOST: &str = "appConfigHost";
/// Property carrying a connection string.
pub const CONNECTION_STRING: &str = "appConfigConnectionString";
/// Property for the client's maximum retry count.
pub const MAX_RETRIES: &str = "maxRetries";
/// Property for the client's initial retry delay.
pub const RETRY_DELAY: &str = "retryDelay";
/// Property for the client's retry delay cap.
pub const MAX_RETRY_DELAY: &str = "maxRetryDelay";
/// Property for the default subscription poll interval.
pub const SUBSCRIBE_POLL_INTERVAL: &str = "subscribePollInterval";

/// Default maximum retry count.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default initial retry delay.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(4);
/// Default retry delay cap.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(120);
/// Default subscription poll interval.
pub const DEFAULT_SUBSCRIBE_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Where the backend client connects to. Exactly one is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    /// Endpoint URL of the store.
    Host(String),
    /// Connection string of the form `Endpoint=...;Id=...;Secret=...`.
    ConnectionString(String),
}

/// Retry bounds handed to the backend client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub retry_delay: Duration,
    /// Upper bound for any single delay
    pub max_retry_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.retry_delay
            .saturating_mul(factor)
            .min(self.max_retry_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
        }
    }
}

/// Parsed store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMetadata {
    /// Connection target of the backend client
    pub target: ConnectionTarget,
    /// Retry bounds of the backend client
    pub retry: RetryPolicy,
    /// Default poll interval for subscriptions
    pub poll_interval: Duration,
}

impl StoreMetadata {
    /// Metadata for an endpoint with default retry bounds and poll interval.
    pub fn new(target: ConnectionTarget) -> Self {
        Self {
            target,
            retry: RetryPolicy::default(),
            poll_interval: DEFAULT_SUBSCRIBE_POLL_INTERVAL,
        }
    }

    /// Parse metadata from string properties.
    ///
    /// Property names are matched case-insensitively and empty values count as
    /// absent. Durations are either a bare number of milliseconds or a number
    /// with one of the suffixes `ms`, `s`, `m`, `h`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if both or neither of [`HOST`] and
    /// [`CONNECTION_STRING`] are set, or if a numeric option cannot be parsed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sentinel_config::core::{ConnectionTarget, StoreMetadata};
    /// use std::collections::HashMap;
    /// use std::time::Duration;
    ///
    /// let props = HashMap::from([
    ///     ("appConfigHost".to_string(), "https://store.example.com".to_string()),
    ///     ("subscribePollInterval".to_string(), "5s".to_string()),
    /// ]);
    /// let metadata = StoreMetadata::from_properties(&props).unwrap();
    /// assert_eq!(metadata.poll_interval, Duration::from_secs(5));
    /// assert!(matches!(metadata.target, ConnectionTarget::Host(_)));
    /// ```
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        let host = property(properties, HOST)?;
        let connection_string = property(properties, CONNECTION_STRING)?;

        let target = match (host, connection_string) {
            (Some(_), Some(_)) => {
                return Err(ValidationError::custom(format!(
                    "can't set both {} and {} fields in metadata",
                    HOST, CONNECTION_STRING
                ))
                .into());
            }
            (None, None) => {
                return Err(ValidationError::custom(format!(
                    "specify {} or {} field in metadata",
                    HOST, CONNECTION_STRING
                ))
                .into());
            }
            (Some(host), None) => ConnectionTarget::Host(host.to_string()),
            (None, Some(cs)) => ConnectionTarget::ConnectionString(cs.to_string()),
        };

        let max_retries = match property(properties, MAX_RETRIES)? {
            Some(value) => value.trim().parse::<u32>().map_err(|e| {
                ValidationError::invalid_field(MAX_RETRIES, format!("can't parse '{}': {}", value, e))
            })?,
            None => DEFAULT_MAX_RETRIES,
        };

        let metadata = Self {
            target,
            retry: RetryPolicy {
                max_retries,
                retry_delay: duration_property(properties, RETRY_DELAY, DEFAULT_RETRY_DELAY)?,
                max_retry_delay: duration_property(
                    properties,
                    MAX_RETRY_DELAY,
                    DEFAULT_MAX_RETRY_DELAY,
                )?,
            },
            poll_interval: duration_property(
                properties,
                SUBSCRIBE_POLL_INTERVAL,
                DEFAULT_SUBSCRIBE_POLL_INTERVAL,
            )?,
        };

        Ok(metadata)
    }
}

impl Validate for StoreMetadata {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.poll_interval.is_zero() {
            errors.push(ValidationError::invalid_field(
                SUBSCRIBE_POLL_INTERVAL,
                "must be greater than zero",
            ));
        }

        if self.retry.retry_delay > self.retry.max_retry_delay {
            errors.push(ValidationError::invalid_field(
                RETRY_DELAY,
                format!("must not exceed {}", MAX_RETRY_DELAY),
            ));
        }

        match &self.target {
            ConnectionTarget::Host(host) if host.trim().is_empty() => {
                errors.push(ValidationError::invalid_field(HOST, "must not be blank"));
            }
            ConnectionTarget::ConnectionString(cs) if cs.trim().is_empty() => {
                errors.push(ValidationError::invalid_field(
                    CONNECTION_STRING,
                    "must not be blank",
                ));
            }
            _ => {}
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

/// Look up `name` case-insensitively.
///
/// Names differing only in case must agree on their value.
fn property<'a>(properties: &'a HashMap<String, String>, name: &str) -> Result<Option<&'a str>> {
    let mut found: Option<&'a str> = None;
    for (key, value) in properties {
        if !key.eq_ignore_ascii_case(name) || value.is_empty() {
            continue;
        }
        match found {
            Some(existing) if existing != value.as_str() => {
                return Err(ValidationError::invalid_field(
                    name,
                    "is set more than once with different values",
                )
                .into());
            }
            _ => found = Some(value.as_str()),
        }
    }
    Ok(found)
}

fn duration_property(
    properties: &HashMap<String, String>,
    name: &str,
    default: Duration,
) -> Result<Duration> {
    match property(properties, name)? {
        Some(value) => parse_duration(value).ok_or_else(|| {
            ValidationError::invalid_field(name, format!("can't parse duration '{}'", value)).into()
        }),
        None => Ok(default),
    }
}

/// Parse `1500`, `1500ms`, `30s`, `2m` or `1h`.
pub(crate) fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: u64 = number.parse().ok()?;

    match unit.trim() {
        "" | "ms" => Some(Duration::from_millis(number)),
        "s" => Some(Duration::from_secs(number)),
        "m" => Some(Duration::from_secs(number.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(number.checked_mul(3600)?)),
        _ => None,
    }
}
