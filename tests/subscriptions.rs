//! End-to-end subscription behavior against the in-memory backend.

use sentinel_config::backend::InMemoryClient;
use sentinel_config::prelude::*;
use sentinel_config::notify::PollState;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn seeded_client() -> InMemoryClient {
    let client = InMemoryClient::new();
    client.set("sentinel1", "v1", None);
    client.set("a", "1", None);
    client.set("b", "2", None);
    client.set("c", "3", None);
    client
}

fn store(client: &InMemoryClient, interval: Duration) -> ConfigurationStore {
    ConfigurationStore::builder()
        .with_host("https://store.example.com")
        .with_poll_interval(interval)
        .with_client(client.clone())
        .build()
        .unwrap()
}

fn channel_handler() -> (
    impl UpdateHandler,
    mpsc::UnboundedReceiver<UpdateEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |event: UpdateEvent| {
        let tx = tx.clone();
        async move { tx.send(event).map_err(|e| HandlerError::from(e.to_string())) }
    };
    (handler, rx)
}

#[tokio::test(start_paused = true)]
async fn test_delivers_then_stops_after_unsubscribe() {
    let client = seeded_client();
    let store = store(&client, Duration::from_millis(100));
    let (handler, mut rx) = channel_handler();

    let id = store
        .subscribe(
            SubscribeRequest::new(["a", "b"]).with_sentinel_key("sentinel1"),
            handler,
        )
        .await
        .unwrap();

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("event within one interval")
        .unwrap();
    assert_eq!(event.id, id);
    assert_eq!(event.items.len(), 2);
    assert_eq!(event.items["a"].value(), "1");
    assert_eq!(event.items["b"].value(), "2");

    store.unsubscribe(&id).await.unwrap();
    while rx.try_recv().is_ok() {}

    // The loop drops its handler on exit, closing the channel without further events.
    let after = timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(matches!(after, Ok(None)));
    assert_eq!(store.active_subscriptions().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_every_cycle_delivers_by_default() {
    let client = seeded_client();
    let store = store(&client, Duration::from_millis(100));
    let (handler, mut rx) = channel_handler();

    store
        .subscribe(
            SubscribeRequest::new(["a"]).with_sentinel_key("sentinel1"),
            handler,
        )
        .await
        .unwrap();

    for _ in 0..3 {
        assert!(
            timeout(Duration::from_millis(150), rx.recv())
                .await
                .unwrap()
                .is_some()
        );
    }
    store.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_sentinel_value_detection_skips_unchanged_cycles() {
    let client = seeded_client();
    let store = store(&client, Duration::from_millis(100));
    let (handler, mut rx) = channel_handler();

    store
        .subscribe(
            SubscribeRequest::new(["a"])
                .with_sentinel_key("sentinel1")
                .with_change_detection(ChangeDetection::SentinelValue),
            handler,
        )
        .await
        .unwrap();

    assert!(rx.recv().await.is_some());
    assert!(
        timeout(Duration::from_millis(350), rx.recv()).await.is_err(),
        "unchanged sentinel must not deliver"
    );

    client.set("a", "10", None);
    client.set("sentinel1", "v2", None);
    let event = timeout(Duration::from_millis(150), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.items["a"].value(), "10");
    store.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_sentinel_skips_cycles_until_it_appears() {
    let client = seeded_client();
    client.remove("sentinel1", None);
    let store = store(&client, Duration::from_millis(100));
    let (handler, mut rx) = channel_handler();

    let id = store
        .subscribe(
            SubscribeRequest::new(["a"]).with_sentinel_key("sentinel1"),
            handler,
        )
        .await
        .unwrap();

    assert!(timeout(Duration::from_millis(350), rx.recv()).await.is_err());
    assert_eq!(store.subscription_state(&id).await, Some(PollState::Running));

    client.set("sentinel1", "v1", None);
    assert!(
        timeout(Duration::from_millis(150), rx.recv())
            .await
            .unwrap()
            .is_some()
    );
    store.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_key_fetch_failure_skips_delivery() {
    let client = seeded_client();
    client.fail_key("b");
    let store = store(&client, Duration::from_millis(100));
    let (handler, mut rx) = channel_handler();

    store
        .subscribe(
            SubscribeRequest::new(["a", "b"]).with_sentinel_key("sentinel1"),
            handler,
        )
        .await
        .unwrap();

    assert!(timeout(Duration::from_millis(250), rx.recv()).await.is_err());

    client.restore_key("b");
    let event = timeout(Duration::from_millis(150), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.items.len(), 2);
    store.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_failing_handler_keeps_polling() {
    let client = seeded_client();
    let store = store(&client, Duration::from_millis(100));
    let calls = Arc::new(AtomicUsize::new(0));

    let calls_clone = Arc::clone(&calls);
    store
        .subscribe(
            SubscribeRequest::new(["a"]).with_sentinel_key("sentinel1"),
            move |_event: UpdateEvent| {
                let calls = Arc::clone(&calls_clone);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                        panic!("handler blew up");
                    }
                    Err::<(), HandlerError>("handler refused".into())
                }
            },
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert!(calls.load(Ordering::SeqCst) >= 4);
    store.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_subscriptions_partition_keys() {
    let client = seeded_client();
    let store = store(&client, Duration::from_millis(100));
    let (first_handler, mut first_rx) = channel_handler();
    let (second_handler, mut second_rx) = channel_handler();

    let first = store
        .subscribe(
            SubscribeRequest::new(["a", "b"]).with_sentinel_key("sentinel1"),
            first_handler,
        )
        .await
        .unwrap();
    let second = store
        .subscribe(
            SubscribeRequest::new(["b", "c"]).with_sentinel_key("sentinel1"),
            second_handler,
        )
        .await
        .unwrap();

    assert_eq!(store.watcher_of("b").await, Some(first.clone()));
    assert_eq!(store.watcher_of("c").await, Some(second.clone()));

    let event = first_rx.recv().await.unwrap();
    assert_eq!(event.items.len(), 2);
    let event = second_rx.recv().await.unwrap();
    assert_eq!(event.items.keys().collect::<Vec<_>>(), vec!["c"]);

    // Releasing the first subscription does not hand "b" to the second.
    store.unsubscribe(&first).await.unwrap();
    assert_eq!(store.watcher_of("b").await, None);
    assert_eq!(store.watcher_of("c").await, Some(second));
    store.close().await;
}

#[tokio::test]
async fn test_subscribe_validation_errors() {
    let client = seeded_client();
    let store = store(&client, Duration::from_millis(100));

    let (handler, _rx) = channel_handler();
    let err = store
        .subscribe(SubscribeRequest::new(["a"]), handler)
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingSentinelKey));

    let (handler, _rx) = channel_handler();
    let err = store
        .subscribe(
            SubscribeRequest::new(["a"]).with_sentinel_key(""),
            handler,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingSentinelKey));

    let (handler, _rx) = channel_handler();
    let err = store
        .subscribe(
            SubscribeRequest::new(Vec::<String>::new()).with_sentinel_key("sentinel1"),
            handler,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::NoKeysRequested));

    assert_eq!(store.active_subscriptions().await, 0);
    assert_eq!(store.watcher_of("a").await, None);
}

#[tokio::test(start_paused = true)]
async fn test_all_keys_taken_message() {
    let client = seeded_client();
    let store = store(&client, Duration::from_millis(100));

    let (handler, _rx) = channel_handler();
    store
        .subscribe(
            SubscribeRequest::new(["a", "b"]).with_sentinel_key("sentinel1"),
            handler,
        )
        .await
        .unwrap();

    let (handler, _rx) = channel_handler();
    let err = store
        .subscribe(
            SubscribeRequest::new(["b", "a"]).with_sentinel_key("sentinel1"),
            handler,
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "All provided keys are already subscribed");
    assert_eq!(store.active_subscriptions().await, 1);
    store.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_after_close_fails() {
    let client = seeded_client();
    let store = store(&client, Duration::from_millis(100));
    store.close().await;

    let (handler, _rx) = channel_handler();
    let err = store
        .subscribe(
            SubscribeRequest::new(["a"]).with_sentinel_key("sentinel1"),
            handler,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::Closed));
    assert_eq!(store.watcher_of("a").await, None);
    assert_eq!(store.active_subscriptions().await, 0);

    // Reads still work on a closed store.
    let items = store.get(GetRequest::new(["a"])).await.unwrap();
    assert_eq!(items["a"].value(), "1");
}

#[tokio::test(start_paused = true)]
async fn test_context_cancellation_releases_keys() {
    let client = seeded_client();
    let store = store(&client, Duration::from_millis(100));
    let context = CancellationToken::new();
    let (handler, mut rx) = channel_handler();

    store
        .subscribe_with_context(
            SubscribeRequest::new(["a"]).with_sentinel_key("sentinel1"),
            handler,
            &context,
        )
        .await
        .unwrap();
    assert!(rx.recv().await.is_some());

    context.cancel();
    while rx.recv().await.is_some() {}
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(store.active_subscriptions().await, 0);
    assert_eq!(store.watcher_of("a").await, None);

    // Unsubscribing after the loop retired itself is still fine.
    let (handler, _rx) = channel_handler();
    let id = store
        .subscribe(
            SubscribeRequest::new(["a"]).with_sentinel_key("sentinel1"),
            handler,
        )
        .await
        .unwrap();
    store.unsubscribe(&id).await.unwrap();
    store.unsubscribe(&id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_labelled_subscription_reads_labelled_keys() {
    let client = InMemoryClient::new();
    client.set("sentinel1", "v1", Some("prod"));
    client.set("a", "prod-a", Some("prod"));
    client.set("a", "plain-a", None);

    let store = store(&client, Duration::from_millis(100));
    let (handler, mut rx) = channel_handler();
    store
        .subscribe(
            SubscribeRequest::new(["a"])
                .with_sentinel_key("sentinel1")
                .with_label("prod"),
            handler,
        )
        .await
        .unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.items["a"].value(), "prod-a");
    assert_eq!(event.items["a"].label(), Some("prod"));
    store.close().await;
}
