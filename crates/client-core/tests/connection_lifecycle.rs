//! Integration tests for the connection manager
//!
//! Exercises the channel lifecycle against the transport double:
//! credentialed open, idempotence, credential replacement, close/send
//! semantics, bounded retry, auth rejection, and automatic reconnect.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use tokio::sync::mpsc;

use calldesk_client_core::{
    ConnectionConfig, ConnectionManager, ConnectionState, ClientCommand, ClientError, RetryConfig,
};
use common::{init_tracing, wait_until, MockTransport, ServerHandle};

fn quick_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(30),
        backoff_multiplier: 1.5,
        use_jitter: false,
    }
}

fn manager(
    transport: Arc<MockTransport>,
    max_attempts: u32,
) -> ConnectionManager {
    ConnectionManager::new(
        ConnectionConfig {
            url: "ws://localhost:3000/ws".to_string(),
            retry: quick_retry(max_attempts),
        },
        transport,
    )
}

async fn expect_connection(
    connections: &mut mpsc::UnboundedReceiver<ServerHandle>,
) -> ServerHandle {
    tokio::time::timeout(Duration::from_secs(2), connections.recv())
        .await
        .expect("no connection attempt")
        .expect("connections channel closed")
}

/// open() dials with the bearer credential and reaches Connected
#[tokio::test]
#[serial]
async fn test_open_presents_bearer_credential() {
    init_tracing();
    let (transport, mut connections) = MockTransport::new();
    let connection = manager(transport, 3);

    assert_eq!(connection.state(), ConnectionState::Disconnected);
    connection.open("token-1").await;

    let server = expect_connection(&mut connections).await;
    assert_eq!(server.bearer_token, "token-1");

    wait_until("connected", Duration::from_secs(2), || async {
        connection.state() == ConnectionState::Connected
    })
    .await;

    connection.shutdown();
}

/// open() with the live credential is a no-op; a new credential replaces
/// the channel
#[tokio::test]
#[serial]
async fn test_open_idempotence_and_replacement() {
    init_tracing();
    let (transport, mut connections) = MockTransport::new();
    let connection = manager(transport, 3);

    connection.open("token-1").await;
    let _server = expect_connection(&mut connections).await;
    wait_until("connected", Duration::from_secs(2), || async {
        connection.state() == ConnectionState::Connected
    })
    .await;

    // Same credential: nothing happens
    connection.open("token-1").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(connections.try_recv().is_err(), "no redial expected");

    // Refreshed credential: the channel is recreated, not mutated
    connection.open("token-2").await;
    let replacement = expect_connection(&mut connections).await;
    assert_eq!(replacement.bearer_token, "token-2");

    connection.shutdown();
}

/// close() tears down immediately and send() fails until reopened
#[tokio::test]
#[serial]
async fn test_close_then_send_fails() {
    init_tracing();
    let (transport, mut connections) = MockTransport::new();
    let connection = manager(transport, 3);

    connection.open("token-1").await;
    let _server = expect_connection(&mut connections).await;
    wait_until("connected", Duration::from_secs(2), || async {
        connection.state() == ConnectionState::Connected
    })
    .await;

    connection.close().await;
    wait_until("disconnected", Duration::from_secs(2), || async {
        connection.state() == ConnectionState::Disconnected
    })
    .await;

    let result = connection.send(&ClientCommand::JoinQueueMonitor);
    assert!(matches!(result, Err(ClientError::NotConnected)));

    connection.shutdown();
}

/// Credential rejection parks in Error without retrying
#[tokio::test]
#[serial]
async fn test_auth_rejection_is_fatal() {
    init_tracing();
    let (transport, _connections) = MockTransport::new();
    transport.set_reject_auth(true);
    let connection = manager(transport.clone(), 5);

    connection.open("expired-token").await;

    wait_until("error state", Duration::from_secs(2), || async {
        connection.state() == ConnectionState::Error
    })
    .await;

    // One dial was enough; an invalid credential is not retried
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(transport.dial_attempts(), 1);

    connection.shutdown();
}

/// Transient failures retry up to the ceiling, then park in Error
#[tokio::test]
#[serial]
async fn test_bounded_retry_exhaustion() {
    init_tracing();
    let (transport, _connections) = MockTransport::new();
    transport.set_refuse_connect(true);
    let connection = manager(transport.clone(), 3);

    connection.open("token-1").await;

    wait_until("error state", Duration::from_secs(2), || async {
        connection.state() == ConnectionState::Error
    })
    .await;
    assert_eq!(transport.dial_attempts(), 3);

    connection.shutdown();
}

/// A dropped channel redials automatically and subscriptions survive
#[tokio::test]
#[serial]
async fn test_reconnect_preserves_subscriptions() {
    init_tracing();
    let (transport, mut connections) = MockTransport::new();
    let connection = manager(transport, 10);

    let mut subscription = connection.subscribe_all();

    connection.open("token-1").await;
    let server = expect_connection(&mut connections).await;
    wait_until("connected", Duration::from_secs(2), || async {
        connection.state() == ConnectionState::Connected
    })
    .await;

    server.disconnect();

    // The manager redials with the same credential on its own
    let replacement = expect_connection(&mut connections).await;
    assert_eq!(replacement.bearer_token, "token-1");
    wait_until("reconnected", Duration::from_secs(2), || async {
        connection.state() == ConnectionState::Connected
    })
    .await;

    // The pre-existing subscription still receives events
    replacement.push_event("error", 1, serde_json::json!({ "message": "shard restarted" }));
    let event = tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .expect("no event after reconnect")
        .expect("subscription closed");
    assert_eq!(event.seq(), 1);

    connection.shutdown();
}

/// Sequence numbers are tracked monotonically across events
#[tokio::test]
#[serial]
async fn test_last_seq_tracks_maximum() {
    init_tracing();
    let (transport, mut connections) = MockTransport::new();
    let connection = manager(transport, 3);

    let mut subscription = connection.subscribe_all();
    connection.open("token-1").await;
    let server = expect_connection(&mut connections).await;
    wait_until("connected", Duration::from_secs(2), || async {
        connection.state() == ConnectionState::Connected
    })
    .await;

    server.push_event("error", 4, serde_json::json!({ "message": "a" }));
    server.push_event("error", 9, serde_json::json!({ "message": "b" }));
    // Out-of-order delivery must not move the high-water mark backwards
    server.push_event("error", 7, serde_json::json!({ "message": "c" }));

    for _ in 0..3 {
        tokio::time::timeout(Duration::from_secs(2), subscription.recv())
            .await
            .expect("missing event")
            .expect("subscription closed");
    }
    assert_eq!(connection.last_seq(), 9);

    connection.shutdown();
}
