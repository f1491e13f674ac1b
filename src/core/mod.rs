//! Core store types: requests, items, metadata and the store itself.

mod builder;
mod fetcher;
mod item;
mod loader;
mod metadata;
mod store;
mod validation;

pub use builder::ConfigurationStoreBuilder;
pub use fetcher::ItemFetcher;
pub use item::{
    GetRequest, Item, LABEL_METADATA, SENTINEL_KEY_METADATA, SubscribeRequest, SubscriptionId,
    UpdateEvent,
};
pub(crate) use loader::PropertiesLoader;
pub use metadata::{
    CONNECTION_STRING, ConnectionTarget, DEFAULT_MAX_RETRIES, DEFAULT_MAX_RETRY_DELAY,
    DEFAULT_RETRY_DELAY, DEFAULT_SUBSCRIBE_POLL_INTERVAL, HOST, MAX_RETRIES, MAX_RETRY_DELAY,
    RETRY_DELAY, RetryPolicy, SUBSCRIBE_POLL_INTERVAL, StoreMetadata,
};
pub use store::ConfigurationStore;
pub use validation::Validate;
