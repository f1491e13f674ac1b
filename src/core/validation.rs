//! Validation support for store settings.

use crate::error::ValidationError;

/// Trait for validating parsed settings before they are used.
///
/// [`StoreMetadata`](crate::core::StoreMetadata) implements this trait and is
/// validated by the store builder. Custom settings types layered on top of the
/// store can implement it the same way.
///
/// # Examples
///
/// ```rust
/// use sentinel_config::core::Validate;
/// use sentinel_config::error::ValidationError;
///
/// struct WatchSettings {
///     keys: Vec<String>,
///     sentinel_key: String,
/// }
///
/// impl Validate for WatchSettings {
///     fn validate(&self) -> Result<(), ValidationError> {
///         if self.sentinel_key.is_empty() {
///             return Err(ValidationError::invalid_field(
///                 "sentinel_key",
///                 "must not be empty"
///             ));
///         }
///
///         if self.keys.contains(&self.sentinel_key) {
///             return Err(ValidationError::custom(
///                 "the sentinel key should not also be watched"
///             ));
///         }
///
///         Ok(())
///     }
/// }
/// ```
pub trait Validate {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
