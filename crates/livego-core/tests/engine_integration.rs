//! Sync engine integration tests
//!
//! These tests drive `LiveClient`/`LiveComponent` against an in-memory
//! transport that records every round trip.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{props, FakeServer, Recorded};
use livego_core::{
    ClientConfig, Delta, ErrorPayload, Intent, LiveClient, LiveComponent, LiveError,
    MountOptions, Unsubscribe,
};
use parking_lot::Mutex;
use serde_json::json;

// ============================================================================
// Test Utilities
// ============================================================================

fn client() -> LiveClient<FakeServer> {
    common::init_tracing();
    LiveClient::with_config(FakeServer::new(), ClientConfig::default())
}

async fn mounted_counter(client: &LiveClient<FakeServer>) -> LiveComponent<FakeServer> {
    client
        .mount("counter", props(json!({"count": 0})), MountOptions::default())
        .await
        .expect("mount succeeds")
}

// ============================================================================
// Mount
// ============================================================================

#[tokio::test]
async fn test_mount_binds_initial_snapshot() {
    let client = client();
    let counter = client
        .mount("counter", props(json!({"count": 3, "label": "clicks"})), MountOptions::default())
        .await
        .unwrap();

    assert!(counter.is_mounted());
    assert_eq!(counter.id().as_deref(), Some("counter-1"));
    assert_eq!(counter.name(), "counter");
    assert_eq!(counter.state().unwrap()["count"], json!(3));
    assert_eq!(counter.checksum().as_deref(), Some("v1"));
    assert_eq!(counter.memo().unwrap().name, "counter");

    assert_eq!(
        client.transport().recorded(),
        vec![Recorded::Mount {
            endpoint: "/api/livego".to_string(),
            component: "counter".to_string(),
            props: props(json!({"count": 3, "label": "clicks"})),
        }]
    );
}

#[tokio::test]
async fn test_failed_mount_surfaces_payload_unchanged() {
    let payload = ErrorPayload::new("COMPONENT_NOT_FOUND", "no component named nope", 404);
    let client = LiveClient::with_config(
        FakeServer::failing_mount(payload.clone()),
        ClientConfig::default(),
    );

    let result = client.mount("nope", props(json!({})), MountOptions::default()).await;
    assert_eq!(result.err(), Some(LiveError::Transport(payload.clone())));

    let component = client.component("nope");
    assert!(component.mount(props(json!({})), MountOptions::default()).await.is_err());
    assert!(!component.is_mounted());
    assert!(component.snapshot().is_none());
    assert_eq!(component.last_error(), Some(LiveError::Transport(payload)));
}

#[tokio::test]
async fn test_mount_options_override_config_for_updates() {
    let client = client();
    let override_config = ClientConfig::default().with_endpoint("/tenant/livego");
    let counter = client
        .mount("counter", props(json!({})), MountOptions::with_config(override_config))
        .await
        .unwrap();
    counter.call("increment", vec![]).await.unwrap();

    let endpoints: Vec<String> = client
        .transport()
        .recorded()
        .into_iter()
        .map(|call| match call {
            Recorded::Mount { endpoint, .. } | Recorded::Update { endpoint, .. } => endpoint,
        })
        .collect();
    assert_eq!(endpoints, vec!["/tenant/livego", "/tenant/livego"]);
    assert_eq!(client.config().endpoint, "/api/livego");
}

#[tokio::test]
async fn test_failed_remount_keeps_previous_config() {
    let client = client();
    let counter = mounted_counter(&client).await;

    *client.transport().mount_error.lock() =
        Some(ErrorPayload::new("COMPONENT_NOT_FOUND", "gone", 404));
    let override_config = ClientConfig::default().with_endpoint("/tenant/livego");
    let result = counter
        .mount(props(json!({})), MountOptions::with_config(override_config))
        .await;
    assert!(result.is_err());
    assert_eq!(counter.config().endpoint, "/api/livego");

    *client.transport().mount_error.lock() = None;
    counter.call("increment", vec![]).await.unwrap();
    match client.transport().recorded().last() {
        Some(Recorded::Update { endpoint, .. }) => assert_eq!(endpoint, "/api/livego"),
        other => panic!("expected an update, got {other:?}"),
    }
}

// ============================================================================
// Updates
// ============================================================================

#[tokio::test]
async fn test_updates_before_mount_never_reach_transport() {
    let client = client();
    let component = client.component("counter");

    assert_eq!(component.call("increment", vec![]).await, Err(LiveError::NotMounted));
    assert_eq!(component.set("count", 5).await, Err(LiveError::NotMounted));
    assert_eq!(
        component.batch(vec![Intent::set("a", 1)]).await,
        Err(LiveError::NotMounted)
    );
    assert!(client.transport().recorded().is_empty());
}

#[tokio::test]
async fn test_batch_is_one_ordered_round_trip() {
    let client = client();
    let form = mounted_counter(&client).await;

    form.batch(vec![
        Intent::set("a", 1),
        Intent::set("b", 2),
        Intent::call("validate", vec![]),
    ])
    .await
    .unwrap();

    assert_eq!(
        client.transport().update_batches(),
        vec![vec![
            Delta::SyncInput { field: "a".to_string(), value: json!(1) },
            Delta::SyncInput { field: "b".to_string(), value: json!(2) },
            Delta::CallMethod { method: "validate".to_string(), params: vec![] },
        ]]
    );
}

#[tokio::test]
async fn test_call_and_set_send_single_deltas() {
    let client = client();
    let counter = mounted_counter(&client).await;

    let effects = counter.call("increment", vec![json!(2)]).await.unwrap();
    assert!(effects.dirty.contains("count"));
    counter.set("label", "hits").await.unwrap();

    let batches = client.transport().update_batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(
        batches[0],
        vec![Delta::CallMethod { method: "increment".to_string(), params: vec![json!(2)] }]
    );
    assert_eq!(
        batches[1],
        vec![Delta::SyncInput { field: "label".to_string(), value: json!("hits") }]
    );
    assert_eq!(counter.state().unwrap()["count"], json!(2));
    assert_eq!(counter.state().unwrap()["label"], json!("hits"));
}

#[tokio::test]
async fn test_each_update_carries_latest_checksum() {
    let client = client();
    let counter = mounted_counter(&client).await;

    counter.call("increment", vec![]).await.unwrap();
    counter.call("increment", vec![]).await.unwrap();

    let checksums: Vec<String> = client
        .transport()
        .recorded()
        .into_iter()
        .filter_map(|call| match call {
            Recorded::Update { checksum, .. } => Some(checksum),
            Recorded::Mount { .. } => None,
        })
        .collect();
    assert_eq!(checksums, vec!["v1", "v2"]);
    assert_eq!(counter.checksum().as_deref(), Some("v3"));
}

#[tokio::test]
async fn test_response_replaces_state_without_merging() {
    let client = client();
    let counter = client
        .mount("counter", props(json!({"count": 9, "extra": true})), MountOptions::default())
        .await
        .unwrap();

    counter.call("reset", vec![]).await.unwrap();

    let state = counter.state().unwrap();
    assert_eq!(state.len(), 1);
    assert_eq!(state["count"], json!(0));
    assert!(!state.contains_key("extra"));
}

#[tokio::test]
async fn test_failed_update_keeps_snapshot_and_skips_subscribers() {
    let client = client();
    let counter = mounted_counter(&client).await;
    counter.call("increment", vec![]).await.unwrap();
    let before = counter.snapshot().unwrap();

    let notified = Arc::new(Mutex::new(0));
    let notified_in_cb = notified.clone();
    counter.subscribe(move |_, _| *notified_in_cb.lock() += 1);

    let err = counter.call("reject", vec![]).await.unwrap_err();
    assert_eq!(err.payload().map(|p| p.error.as_str()), Some("VALIDATION"));
    assert_eq!(counter.snapshot().unwrap(), before);
    assert_eq!(*notified.lock(), 0);
    assert_eq!(counter.last_error(), Some(err));

    counter.call("increment", vec![]).await.unwrap();
    assert_eq!(*notified.lock(), 1);
    assert!(counter.last_error().is_none());
}

#[tokio::test]
async fn test_protocol_error_passes_through() {
    let client = client();
    let counter = mounted_counter(&client).await;

    let err = counter.call("malformed", vec![]).await.unwrap_err();
    assert!(matches!(err, LiveError::Protocol(_)));
    assert_eq!(counter.state().unwrap()["count"], json!(0));
}

#[tokio::test]
async fn test_empty_batch_issues_no_request() {
    let client = client();
    let counter = mounted_counter(&client).await;

    let effects = counter.batch(Vec::new()).await.unwrap();
    assert!(effects.is_empty());
    assert!(client.transport().update_batches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_updates_last_response_wins() {
    let client = client();
    let component = mounted_counter(&client).await;

    // Sent first, answered last.
    let slow = component.call("delayed", vec![json!(100), json!("slow")]);
    let fast = component.call("delayed", vec![json!(10), json!("fast")]);
    let (slow, fast) = tokio::join!(slow, fast);
    slow.unwrap();
    fast.unwrap();

    assert_eq!(component.state().unwrap()["value"], json!("slow"));
}

// ============================================================================
// Subscribers
// ============================================================================

#[tokio::test]
async fn test_subscribers_see_current_snapshot_in_registration_order() {
    let client = client();
    let counter = Arc::new(mounted_counter(&client).await);
    let log = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let log = log.clone();
        let weak = Arc::downgrade(&counter);
        counter.subscribe(move |state, effects| {
            let current = weak.upgrade().and_then(|c| c.state());
            assert_eq!(current.as_ref(), Some(state));
            log.lock().push(format!("{name}:{}:{}", state["count"], effects.dirty.len()));
        });
    }

    counter.call("increment", vec![json!(5)]).await.unwrap();
    assert_eq!(*log.lock(), vec!["first:5:1", "second:5:1", "third:5:1"]);
}

#[tokio::test]
async fn test_unsubscribe_during_notification_keeps_others() {
    let client = client();
    let counter = mounted_counter(&client).await;
    let log = Arc::new(Mutex::new(Vec::new()));

    let log_a = log.clone();
    counter.subscribe(move |_, _| log_a.lock().push("a"));

    let slot: Arc<Mutex<Option<Unsubscribe>>> = Arc::new(Mutex::new(None));
    let slot_in_cb = slot.clone();
    let log_b = log.clone();
    let handle = counter.subscribe(move |_, _| {
        log_b.lock().push("b");
        if let Some(handle) = slot_in_cb.lock().take() {
            handle.unsubscribe();
        }
    });
    *slot.lock() = Some(handle);

    let log_c = log.clone();
    counter.subscribe(move |_, _| log_c.lock().push("c"));

    counter.call("increment", vec![]).await.unwrap();
    counter.call("increment", vec![]).await.unwrap();

    assert_eq!(*log.lock(), vec!["a", "b", "c", "a", "c"]);
    assert_eq!(counter.subscriber_count(), 2);
}

#[tokio::test]
async fn test_panicking_subscriber_does_not_block_delivery() {
    let client = client();
    let counter = mounted_counter(&client).await;
    let delivered = Arc::new(Mutex::new(false));

    counter.subscribe(|_, _| panic!("subscriber bug"));
    let delivered_in_cb = delivered.clone();
    counter.subscribe(move |_, _| *delivered_in_cb.lock() = true);

    assert!(counter.call("increment", vec![]).await.is_ok());
    assert!(*delivered.lock());
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_destroy_stops_requests_and_clears_subscribers() {
    let client = client();
    let counter = mounted_counter(&client).await;
    counter.subscribe(|_, _| {});

    counter.destroy();

    assert!(!counter.is_mounted());
    assert_eq!(counter.subscriber_count(), 0);
    assert_eq!(counter.call("increment", vec![]).await, Err(LiveError::NotMounted));
    assert!(client.transport().update_batches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_response_after_destroy_is_dropped() {
    let client = client();
    let counter = Arc::new(mounted_counter(&client).await);

    let pending = {
        let counter = counter.clone();
        tokio::spawn(async move { counter.call("delayed", vec![json!(50), json!("late")]).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    counter.destroy();

    assert_eq!(pending.await.unwrap(), Err(LiveError::NotMounted));
    assert!(counter.snapshot().is_none());
    assert_eq!(counter.last_error(), Some(LiveError::NotMounted));
}

#[tokio::test]
async fn test_stream_target_uses_instance_id() {
    let client = client();
    let counter = mounted_counter(&client).await;

    let target = counter.stream_target("sig-123").unwrap();
    assert_eq!(target.component_id, "counter-1");
    assert_eq!(target.signature, "sig-123");
}
