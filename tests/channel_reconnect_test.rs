//! Channel lifecycle integration tests
//!
//! Drives the client state machine with a scripted transport: the reconnect
//! sequence, duplicate suppression across a gap, malformed frames, the
//! attempt cap, and teardown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hearth::channel::mock::{ScriptedConnect, ScriptedTransport};
use hearth::channel::transport::Frame;
use hearth::channel::{ConnectionState, LiveChannelClient};
use hearth::config::{ChannelConfig, EventLogConfig};
use hearth::events::router::EventRouter;
use hearth::store::Store;

fn config() -> ChannelConfig {
    ChannelConfig {
        url: "scripted://live".to_string(),
        retry_interval_ms: 100,
        max_reconnect_attempts: 4,
        heartbeat_interval_secs: 3600,
        connect_timeout_ms: 1000,
    }
}

fn progress_frame(id: &str, student: &str, percent: f64) -> Frame {
    Frame::Event(format!(
        r#"{{"id":"{id}","type":"progress-updated","data":{{"student_id":"{student}","percent_complete":{percent}}}}}"#
    ))
}

struct Harness {
    client: LiveChannelClient,
    transport: Arc<ScriptedTransport>,
    store: Store,
    router: Arc<EventRouter>,
    states: Arc<Mutex<Vec<ConnectionState>>>,
}

fn setup(script: Vec<ScriptedConnect>, config: ChannelConfig) -> Harness {
    let store = Store::new();
    let router = Arc::new(EventRouter::new(store.clone(), &EventLogConfig::default()));
    let transport = Arc::new(ScriptedTransport::new(script));
    let client = LiveChannelClient::new(transport.clone(), Arc::clone(&router), config);

    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    client.on_state_change(move |state| sink.lock().unwrap().push(state));

    Harness {
        client,
        transport,
        store,
        router,
        states,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// =============================================================================
// Reconnect sequence
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_reconnect_sequence_and_no_duplicate_processing() {
    // Connection 1 serves two events then drops; three attempts fail; the
    // fourth (at the configured cap) succeeds and replays one event.
    let harness = setup(
        vec![
            ScriptedConnect::Serve(vec![
                progress_frame("ev-a", "s1", 10.0),
                progress_frame("ev-b", "s2", 20.0),
                Frame::Close { retryable: true },
            ]),
            ScriptedConnect::Fail,
            ScriptedConnect::Fail,
            ScriptedConnect::Fail,
            ScriptedConnect::Serve(vec![
                // Same id as before the gap: must not re-apply.
                progress_frame("ev-b", "s2", 99.0),
                progress_frame("ev-c", "s3", 30.0),
            ]),
        ],
        config(),
    );

    harness.client.connect().await;

    let store = harness.store.clone();
    wait_until(|| store.progress_for("s3").is_some()).await;

    // All three events applied exactly once; the replayed ev-b kept its
    // pre-gap value.
    assert_eq!(store.progress_for("s1").unwrap().percent_complete, 10.0);
    assert_eq!(store.progress_for("s2").unwrap().percent_complete, 20.0);
    assert_eq!(store.progress_for("s3").unwrap().percent_complete, 30.0);
    assert_eq!(harness.router.recent_events().len(), 3);

    assert_eq!(harness.transport.connect_attempts(), 5);
    assert_eq!(
        harness.states.lock().unwrap().clone(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connecting,
            ConnectionState::Connecting,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );

    harness.client.shutdown().await;
}

// =============================================================================
// Attempt cap and explicit reconnect
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cap_reached_stays_disconnected_until_requested() {
    let harness = setup(
        vec![
            ScriptedConnect::Fail,
            ScriptedConnect::Fail,
            ScriptedConnect::Fail,
            ScriptedConnect::Fail,
            ScriptedConnect::Serve(vec![]),
        ],
        config(),
    );

    harness.client.connect().await;

    let transport = Arc::clone(&harness.transport);
    wait_until(|| transport.connect_attempts() == 4).await;
    wait_until({
        let client = harness.client.clone();
        move || client.state() == ConnectionState::Disconnected
    })
    .await;

    // No further attempts happen on their own.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.transport.connect_attempts(), 4);

    harness.client.reconnect().await;
    wait_until({
        let client = harness.client.clone();
        move || client.state() == ConnectionState::Connected
    })
    .await;
    assert_eq!(harness.transport.connect_attempts(), 5);

    harness.client.shutdown().await;
}

// =============================================================================
// Non-retryable close
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_non_retryable_close_reaches_error_then_disconnected() {
    let harness = setup(
        vec![ScriptedConnect::Serve(vec![Frame::Close {
            retryable: false,
        }])],
        config(),
    );

    harness.client.connect().await;

    let client = harness.client.clone();
    wait_until(move || client.state() == ConnectionState::Disconnected).await;

    let states = harness.states.lock().unwrap().clone();
    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Error,
            ConnectionState::Disconnected,
        ]
    );
    // No automatic retry after a fatal close.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.transport.connect_attempts(), 1);
}

// =============================================================================
// Malformed frames
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_dropped_without_crashing() {
    let harness = setup(
        vec![ScriptedConnect::Serve(vec![
            Frame::Event("not json at all".to_string()),
            progress_frame("ev-1", "s1", 55.0),
        ])],
        config(),
    );

    harness.client.connect().await;

    let store = harness.store.clone();
    wait_until(|| store.progress_for("s1").is_some()).await;

    assert_eq!(harness.client.state(), ConnectionState::Connected);
    // The malformed frame never reached the router.
    assert_eq!(harness.router.recent_events().len(), 1);

    harness.client.shutdown().await;
}

// =============================================================================
// Heartbeat
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_keeps_connection_alive() {
    let mut cfg = config();
    cfg.heartbeat_interval_secs = 30;
    let harness = setup(vec![ScriptedConnect::Serve(vec![])], cfg);

    harness.client.connect().await;

    let client = harness.client.clone();
    wait_until(move || client.state() == ConnectionState::Connected).await;

    // Several heartbeat periods pass; the endpoint answers pongs and the
    // connection holds.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(harness.client.state(), ConnectionState::Connected);
    assert_eq!(harness.transport.connect_attempts(), 1);

    harness.client.shutdown().await;
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_reconnect() {
    let mut cfg = config();
    cfg.retry_interval_ms = 1_000_000;
    let harness = setup(vec![ScriptedConnect::Fail, ScriptedConnect::Fail], cfg);

    harness.client.connect().await;

    let transport = Arc::clone(&harness.transport);
    wait_until(move || transport.connect_attempts() == 1).await;

    harness.client.shutdown().await;
    assert_eq!(harness.client.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_secs(2000)).await;
    assert_eq!(harness.transport.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_connect_tears_down_first() {
    let harness = setup(
        vec![ScriptedConnect::Serve(vec![]), ScriptedConnect::Serve(vec![])],
        config(),
    );

    harness.client.connect().await;
    let client = harness.client.clone();
    wait_until(move || client.state() == ConnectionState::Connected).await;

    harness.client.connect().await;
    let transport = Arc::clone(&harness.transport);
    wait_until(move || transport.connect_attempts() == 2).await;
    let client = harness.client.clone();
    wait_until(move || client.state() == ConnectionState::Connected).await;

    // Both connects consumed a script entry: one connection at a time.
    assert_eq!(harness.transport.connect_attempts(), 2);

    harness.client.shutdown().await;
}
