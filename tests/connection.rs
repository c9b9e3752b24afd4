//! Connection state machine and reconnect policy tests.

use alert_pipeline::connection::{ConnectionManager, EnvelopeHandler, MockOutcome, MockTransport};
use alert_pipeline::{
    ConnectionConfig, ConnectionState, EventEnvelope, StatusChange, TopicRegistry, STATUS_TOPIC,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Recorder {
    envelopes: Mutex<Vec<EventEnvelope>>,
}

impl EnvelopeHandler for Recorder {
    fn handle(&self, envelope: EventEnvelope) {
        self.envelopes.lock().push(envelope);
    }
}

struct Harness {
    transport: Arc<MockTransport>,
    manager: Arc<ConnectionManager>,
    handler: Arc<Recorder>,
    statuses: Arc<Mutex<Vec<StatusChange>>>,
}

fn harness(transport: Arc<MockTransport>) -> Harness {
    let registry = TopicRegistry::new();
    let handler = Arc::new(Recorder::default());
    let manager = ConnectionManager::new(
        ConnectionConfig::new("ws://test/feed").with_reconnect_delay(Duration::from_millis(1000)),
        transport.clone(),
        Arc::clone(&registry),
        handler.clone(),
    );

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&statuses);
    manager.subscribe(STATUS_TOPIC, move |envelope: &EventEnvelope| {
        if let Some(change) = StatusChange::from_envelope(envelope) {
            sink.lock().push(change);
        }
    });

    Harness {
        transport,
        manager,
        handler,
        statuses,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn states(statuses: &Mutex<Vec<StatusChange>>) -> Vec<ConnectionState> {
    statuses.lock().iter().map(|s| s.status).collect()
}

fn assert_close(actual: Duration, expected_ms: u64) {
    let expected = Duration::from_millis(expected_ms);
    assert!(
        actual >= expected && actual <= expected + Duration::from_millis(5),
        "expected ~{expected:?}, got {actual:?}"
    );
}

// --- Backoff Policy ---

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_and_stops_after_five_retries() {
    let h = harness(MockTransport::refusing());

    h.manager.connect();
    tokio::time::sleep(Duration::from_secs(120)).await;

    let opens = h.transport.open_times();
    assert_eq!(opens.len(), 6, "initial attempt plus five retries");

    let gaps: Vec<Duration> = opens.windows(2).map(|w| w[1] - w[0]).collect();
    for (gap, expected) in gaps.iter().zip([1000, 2000, 4000, 8000, 16000]) {
        assert_close(*gap, expected);
    }

    assert!(h.manager.is_exhausted());
    assert!(!h.manager.has_pending_retry());
    assert_eq!(h.manager.status(), ConnectionState::Error);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_broadcast_once() {
    let h = harness(MockTransport::refusing());

    h.manager.connect();
    tokio::time::sleep(Duration::from_secs(120)).await;

    let statuses = h.statuses.lock().clone();
    let exhausted: Vec<&StatusChange> = statuses.iter().filter(|s| s.exhausted).collect();
    assert_eq!(exhausted.len(), 1);
    assert_eq!(exhausted[0].status, ConnectionState::Error);
    assert_eq!(exhausted[0].attempt, 5);

    // Nothing further happens on its own.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.transport.open_count(), 6);
    assert_eq!(h.statuses.lock().len(), statuses.len());
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_after_exhaustion() {
    let h = harness(MockTransport::scripted(
        vec![MockOutcome::Refuse("down".to_string()); 6],
        MockOutcome::Accept,
    ));

    h.manager.connect();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(h.manager.is_exhausted());

    h.manager.connect();
    settle().await;

    assert_eq!(h.manager.status(), ConnectionState::Connected);
    assert!(!h.manager.is_exhausted());
    assert_eq!(h.manager.reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_successful_handshake_resets_attempts() {
    let h = harness(MockTransport::scripted(
        vec![
            MockOutcome::Refuse("down".to_string()),
            MockOutcome::Refuse("down".to_string()),
        ],
        MockOutcome::Accept,
    ));

    h.manager.connect();
    settle().await;
    assert_eq!(h.manager.reconnect_attempts(), 1);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(h.manager.status(), ConnectionState::Connected);
    assert_eq!(h.manager.reconnect_attempts(), 0);
    assert_eq!(h.transport.open_count(), 3);
}

// --- Manual Control ---

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let h = harness(MockTransport::accepting());

    h.manager.disconnect();
    assert!(h.statuses.lock().is_empty());

    h.manager.connect();
    settle().await;
    h.manager.disconnect();
    h.manager.disconnect();

    assert_eq!(
        states(&h.statuses),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_retry() {
    let h = harness(MockTransport::refusing());

    h.manager.connect();
    settle().await;
    assert!(h.manager.has_pending_retry());

    h.manager.disconnect();
    assert!(!h.manager.has_pending_retry());
    assert_eq!(h.manager.reconnect_attempts(), 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport.open_count(), 1);
    assert_eq!(h.manager.status(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resets_counter_and_timer() {
    let h = harness(MockTransport::refusing());

    h.manager.connect();
    // Opens at 0, 1000 and 3000 ms; retry 3 is pending.
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(h.transport.open_count(), 3);
    assert_eq!(h.manager.reconnect_attempts(), 3);

    h.manager.reconnect();
    settle().await;
    assert_eq!(h.transport.open_count(), 4);
    assert_eq!(h.manager.reconnect_attempts(), 1);

    // The next retry uses the base delay again, not the 4 s one.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.transport.open_count(), 5);

    let opens = h.transport.open_times();
    assert_close(opens[4] - opens[3], 1000);
}

#[tokio::test(start_paused = true)]
async fn test_stale_handshake_discarded() {
    let transport = MockTransport::slow(Duration::from_millis(500));
    let h = harness(transport);

    h.manager.connect();
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.manager.disconnect();

    tokio::time::sleep(Duration::from_secs(2)).await;

    // The handshake completed, but for a connection that no longer exists.
    assert_eq!(h.transport.peer_count(), 1);
    assert_eq!(h.manager.status(), ConnectionState::Disconnected);
    assert!(!h.manager.send(&serde_json::json!({"type": "ping"})));
    assert_eq!(
        states(&h.statuses),
        vec![ConnectionState::Connecting, ConnectionState::Disconnected]
    );
}

// --- Inbound Frames ---

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_dropped() {
    let h = harness(MockTransport::accepting());

    h.manager.connect();
    settle().await;
    let peer = h.transport.last_peer().unwrap();

    peer.send_text("{not json");
    peer.send_text(r#"{"data": {"no": "type"}}"#);
    peer.send_text(r#"{"type":"sales_update","data":{"totalOrders":3},"timestamp":"2024-01-01T00:00:00Z"}"#);
    settle().await;

    let envelopes = h.handler.envelopes.lock();
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].event_type, "sales_update");
    assert_eq!(h.manager.status(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_server_close_schedules_retry() {
    let h = harness(MockTransport::accepting());

    h.manager.connect();
    settle().await;
    h.transport.last_peer().unwrap().close();
    settle().await;

    assert_eq!(h.manager.status(), ConnectionState::Disconnected);
    assert!(h.manager.has_pending_retry());

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(h.manager.status(), ConnectionState::Connected);
    assert_eq!(h.transport.open_count(), 2);

    assert_eq!(
        states(&h.statuses),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_link_error_moves_to_error() {
    let h = harness(MockTransport::accepting());

    h.manager.connect();
    settle().await;
    h.transport.last_peer().unwrap().fail("reset by peer");
    settle().await;

    assert_eq!(h.manager.status(), ConnectionState::Error);
    assert!(!h.manager.send(&serde_json::json!({"type": "ping"})));
}

#[tokio::test(start_paused = true)]
async fn test_send_reaches_peer() {
    let h = harness(MockTransport::accepting());

    h.manager.connect();
    settle().await;

    assert!(h.manager.send(&serde_json::json!({"type": "subscribe", "channel": "orders"})));
    let sent = h.transport.last_peer().unwrap().try_recv_sent().unwrap();
    let value: serde_json::Value = serde_json::from_str(&sent).unwrap();
    assert_eq!(value["channel"], "orders");
}
