//! Sources of store properties.

mod env;
mod file;
mod property_source;

pub use env::EnvSource;
pub use file::FileSource;
pub use property_source::PropertySource;
