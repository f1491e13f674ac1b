//! Error types for sentinel-config.

use std::fmt;

/// Result type alias for sentinel-config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Error type returned by subscription handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur when working with the configuration store.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The store configuration is invalid (connection target, numeric options, durations).
    #[error("Invalid store configuration: {0}")]
    Configuration(String),

    /// A subscribe request carried no sentinel key.
    #[error("Sentinel key is not provided in metadata")]
    MissingSentinelKey,

    /// A subscribe request carried no keys at all.
    #[error("No keys provided to subscribe")]
    NoKeysRequested,

    /// Every requested key is already owned by another subscription.
    #[error("All provided keys are already subscribed")]
    AllKeysSubscribed,

    /// The store was closed and accepts no new subscriptions.
    #[error("Configuration store is closed")]
    Closed,

    /// The backend has no setting for the requested key and label.
    #[error("Setting not found: key '{key}'{}", label_suffix(.label))]
    NotFound {
        /// The requested key
        key: String,
        /// The requested label, if any
        label: Option<String>,
    },

    /// A backend read or list operation failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Failed to deserialize a backend response or a property source.
    #[error("Failed to deserialize: {0}")]
    DeserializationError(String),

    /// Failed to load store properties from a source.
    #[error("Failed to load properties: {0}")]
    LoadError(String),

    /// A subscription handler returned an error.
    #[error("Handler failed: {0}")]
    Handler(String),

    /// A subscription handler panicked.
    #[error("Handler panicked: {0}")]
    HandlerPanic(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error for other cases.
    #[error("Configuration store error: {0}")]
    Other(String),
}

fn label_suffix(label: &Option<String>) -> String {
    label
        .as_deref()
        .map(|l| format!(", label '{l}'"))
        .unwrap_or_default()
}

impl ConfigError {
    /// Whether this error reports a missing setting rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Validation error for store metadata and requests.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::Configuration(err.to_string())
    }
}
