//! Example demonstrating sentinel-key subscriptions.
//!
//! This example shows how to:
//! - Subscribe to a set of keys guarded by a sentinel key
//! - Only receive updates when the sentinel changes
//! - See overlapping subscriptions split their keys
//! - Unsubscribe and close the store
//!
//! Run with: RUST_LOG=sentinel_config=debug cargo run --example sentinel_polling

use sentinel_config::backend::InMemoryClient;
use sentinel_config::prelude::*;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Sentinel Polling Example ===\n");

    // An in-memory backend stands in for the remote store
    let backend = InMemoryClient::new();
    backend.set("app.sentinel", "1", Some("prod"));
    backend.set("app.color", "blue", Some("prod"));
    backend.set("app.size", "large", Some("prod"));
    backend.set("app.mode", "fast", Some("prod"));

    let store = ConfigurationStore::builder()
        .with_host("https://store.example.com")
        .with_poll_interval(Duration::from_millis(200))
        .with_change_detection(ChangeDetection::SentinelValue)
        .with_client(backend.clone())
        .build()?;

    let everything = store.get(GetRequest::all().with_label("prod")).await?;
    println!("Store holds {} settings under 'prod'\n", everything.len());

    let first = store
        .subscribe(
            SubscribeRequest::new(["app.color", "app.size"])
                .with_sentinel_key("app.sentinel")
                .with_label("prod"),
            |event: UpdateEvent| async move {
                let mut keys: Vec<_> = event.items.iter().collect();
                keys.sort_by(|a, b| a.0.cmp(b.0));
                for (key, item) in keys {
                    println!("[Subscription 1] {} = {}", key, item.value());
                }
                Ok::<(), HandlerError>(())
            },
        )
        .await?;

    // "app.size" is already watched, so this one only gets "app.mode"
    let second = store
        .subscribe(
            SubscribeRequest::new(["app.size", "app.mode"])
                .with_sentinel_key("app.sentinel")
                .with_label("prod"),
            |event: UpdateEvent| async move {
                for (key, item) in &event.items {
                    println!("[Subscription 2] {} = {}", key, item.value());
                }
                Ok::<(), HandlerError>(())
            },
        )
        .await?;

    println!("Subscribed {} handlers\n", store.active_subscriptions().await);
    tokio::time::sleep(Duration::from_millis(500)).await;

    println!("\n--- Changing app.color without touching the sentinel ---");
    backend.set("app.color", "green", Some("prod"));
    tokio::time::sleep(Duration::from_millis(500)).await;

    println!("\n--- Bumping the sentinel ---");
    backend.set("app.sentinel", "2", Some("prod"));
    tokio::time::sleep(Duration::from_millis(500)).await;

    println!("\n--- Unsubscribing Subscription 2 ---");
    store.unsubscribe(&second).await?;
    backend.set("app.mode", "slow", Some("prod"));
    backend.set("app.sentinel", "3", Some("prod"));
    tokio::time::sleep(Duration::from_millis(500)).await;

    store.unsubscribe(&first).await?;
    store.close().await;

    println!("\nAll subscriptions stopped");
    println!("Example complete!");

    Ok(())
}
