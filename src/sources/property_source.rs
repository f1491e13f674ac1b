//! Property source trait.

use crate::error::Result;
use std::collections::HashMap;

/// Trait for sources of store properties.
///
/// Implement this trait to read store properties from somewhere other than
/// files or the environment (a secrets file, a sidecar, a test fixture).
pub trait PropertySource: Send + Sync {
    /// Load properties as a raw key-value map.
    ///
    /// The returned map will be merged with other sources according to precedence rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be loaded or parsed.
    fn load(&self) -> Result<HashMap<String, config::Value>>;

    /// Get a human-readable name for this source (for logging/debugging).
    fn name(&self) -> String;

    /// Get the priority of this source (higher = takes precedence).
    ///
    /// Default priorities:
    /// - Environment variables: 300
    /// - Property files: 100, 110, 120, ... in the order they were added
    fn priority(&self) -> i32 {
        100
    }
}
