//! Integration tests for optimistic mutation reconciliation
//!
//! Covers the mute/unmute contract: immediate local effect, server
//! confirmation by sequence number, stale-event protection, timeout-driven
//! reverts, and the per-user addressing of confirmations.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use tokio::sync::mpsc;

use calldesk_client_core::{
    CallClient, CallState, ClientBuilder, ClientError, ClientEvent, ConnectionState, RetryConfig,
    SessionCredential,
};
use common::{init_tracing, wait_until, MockTransport, ServerHandle};

fn credential() -> SessionCredential {
    SessionCredential {
        access_token: "test-token".to_string(),
        refresh_token: None,
        user_id: "u1".to_string(),
    }
}

async fn start_client() -> (
    Arc<CallClient>,
    ServerHandle,
    mpsc::UnboundedReceiver<ServerHandle>,
) {
    init_tracing();

    let (transport, mut connections) = MockTransport::new();
    let client = ClientBuilder::new()
        .server_url("http://localhost:3000")
        .user_agent("ReconcileTest/1.0")
        .mutation_timeout(Duration::from_millis(250))
        .reconnect(RetryConfig {
            max_attempts: 50,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 1.5,
            use_jitter: false,
        })
        .transport(transport)
        .build()
        .await
        .expect("Failed to build client");

    client.start(&credential()).await.expect("Failed to start client");

    let server = tokio::time::timeout(Duration::from_secs(2), connections.recv())
        .await
        .expect("no connection attempt")
        .expect("connections channel closed");

    wait_until("channel connected", Duration::from_secs(2), || async {
        client.connection_state() == ConnectionState::Connected
    })
    .await;

    (client, server, connections)
}

/// Join a call with id c1 as of server sequence 5
async fn establish_active_call(client: &Arc<CallClient>, server: &mut ServerHandle) {
    client
        .start_call("+15550100", HashMap::new())
        .await
        .expect("start_call failed");
    server.expect_command("initiate-call").await;
    server.push_event(
        "joined-call",
        5,
        serde_json::json!({ "callId": "c1", "status": "active" }),
    );
    wait_until("call active", Duration::from_secs(2), || async {
        client
            .current_call()
            .await
            .map(|c| c.state == CallState::Active)
            .unwrap_or(false)
    })
    .await;
}

/// Mute applies immediately, the confirmation clears the pending entry
#[tokio::test]
#[serial]
async fn test_mute_confirmed_by_server() {
    let (client, mut server, _connections) = start_client().await;
    establish_active_call(&client, &mut server).await;

    client.mute_audio().await.expect("mute_audio failed");

    // Optimistic effect is visible before any round trip
    let call = client.current_call().await.expect("session should exist");
    assert!(call.audio_muted);
    assert_eq!(client.get_client_stats().await.pending_mutations, 1);

    let payload = server.expect_command("mute-audio").await;
    assert_eq!(payload["callId"], "c1");
    assert_eq!(payload["muted"], true);

    server.push_event(
        "audio-muted",
        6,
        serde_json::json!({ "userId": "u1", "callId": "c1", "muted": true }),
    );

    wait_until("confirmation", Duration::from_secs(2), || async {
        client.get_client_stats().await.pending_mutations == 0
    })
    .await;
    assert!(client.current_call().await.expect("session").audio_muted);

    client.stop().await.expect("Failed to stop client");
}

/// No confirmation within the timeout: the flag reverts exactly to its
/// pre-mutation value and a revert notice is raised
#[tokio::test]
#[serial]
async fn test_mute_timeout_reverts() {
    let (client, mut server, _connections) = start_client().await;
    establish_active_call(&client, &mut server).await;

    let mut events = client.subscribe_events();

    client.mute_audio().await.expect("mute_audio failed");
    server.expect_command("mute-audio").await;
    assert!(client.current_call().await.expect("session").audio_muted);

    wait_until("revert", Duration::from_secs(3), || async {
        client
            .current_call()
            .await
            .map(|c| !c.audio_muted)
            .unwrap_or(false)
    })
    .await;
    assert_eq!(client.get_client_stats().await.pending_mutations, 0);

    let mut saw_revert = false;
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::MutationReverted { info, .. } = event {
            assert!(!info.reverted_to);
            saw_revert = true;
        }
    }
    assert!(saw_revert, "expected a MutationReverted event");

    client.stop().await.expect("Failed to stop client");
}

/// Rapid toggles: only the last-issued value survives, and an
/// out-of-order older event must not overwrite it
#[tokio::test]
#[serial]
async fn test_last_toggle_wins_over_stale_event() {
    let (client, mut server, _connections) = start_client().await;
    establish_active_call(&client, &mut server).await;

    client.mute_audio().await.expect("mute_audio failed");
    client.unmute_audio().await.expect("unmute_audio failed");
    server.expect_command("mute-audio").await;
    server.expect_command("mute-audio").await;

    let call = client.current_call().await.expect("session");
    assert!(!call.audio_muted);

    // A confirmation sequenced before the join snapshot is stale: the
    // channel reordered it, and it must not overwrite the newer intent
    server.push_event(
        "audio-muted",
        3,
        serde_json::json!({ "userId": "u1", "callId": "c1", "muted": true }),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!client.current_call().await.expect("session").audio_muted);
    assert_eq!(client.get_client_stats().await.pending_mutations, 1);

    // The properly sequenced confirmation settles the field
    server.push_event(
        "audio-muted",
        6,
        serde_json::json!({ "userId": "u1", "callId": "c1", "muted": false }),
    );
    wait_until("settled", Duration::from_secs(2), || async {
        client.get_client_stats().await.pending_mutations == 0
    })
    .await;
    assert!(!client.current_call().await.expect("session").audio_muted);

    client.stop().await.expect("Failed to stop client");
}

/// Confirmations addressed to other participants do not touch local state
#[tokio::test]
#[serial]
async fn test_other_users_mute_ignored() {
    let (client, mut server, _connections) = start_client().await;
    establish_active_call(&client, &mut server).await;

    client.mute_audio().await.expect("mute_audio failed");
    server.expect_command("mute-audio").await;

    server.push_event(
        "audio-muted",
        6,
        serde_json::json!({ "userId": "u2", "callId": "c1", "muted": false }),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(client.current_call().await.expect("session").audio_muted);
    assert_eq!(client.get_client_stats().await.pending_mutations, 1);

    client.stop().await.expect("Failed to stop client");
}

/// A server-initiated change with nothing pending applies directly
#[tokio::test]
#[serial]
async fn test_server_initiated_mute_applies() {
    let (client, mut server, _connections) = start_client().await;
    establish_active_call(&client, &mut server).await;

    server.push_event(
        "video-muted",
        7,
        serde_json::json!({ "userId": "u1", "callId": "c1", "muted": true }),
    );

    wait_until("server mute applied", Duration::from_secs(2), || async {
        client
            .current_call()
            .await
            .map(|c| c.video_muted)
            .unwrap_or(false)
    })
    .await;

    client.stop().await.expect("Failed to stop client");
}

/// Audio and video reconcile independently
#[tokio::test]
#[serial]
async fn test_audio_and_video_independent() {
    let (client, mut server, _connections) = start_client().await;
    establish_active_call(&client, &mut server).await;

    client.mute_audio().await.expect("mute_audio failed");
    client.mute_video().await.expect("mute_video failed");
    assert_eq!(client.get_client_stats().await.pending_mutations, 2);
    server.expect_command("mute-audio").await;
    server.expect_command("mute-video").await;

    server.push_event(
        "audio-muted",
        6,
        serde_json::json!({ "userId": "u1", "callId": "c1", "muted": true }),
    );
    wait_until("audio confirmed", Duration::from_secs(2), || async {
        client.get_client_stats().await.pending_mutations == 1
    })
    .await;

    let call = client.current_call().await.expect("session");
    assert!(call.audio_muted);
    assert!(call.video_muted); // still optimistic, still pending

    client.stop().await.expect("Failed to stop client");
}

/// Mute is a precondition violation without a session or before the id
/// is assigned
#[tokio::test]
#[serial]
async fn test_mute_preconditions() {
    let (client, mut server, _connections) = start_client().await;

    // No session at all
    let result = client.mute_audio().await;
    assert!(matches!(result, Err(ClientError::NoActiveCall)));

    // Outbound dial without an assigned id: no wire address to target
    client
        .start_call("+15550100", HashMap::new())
        .await
        .expect("start_call failed");
    server.expect_command("initiate-call").await;

    let result = client.mute_audio().await;
    assert!(matches!(result, Err(ClientError::InvalidCallState { .. })));

    client.stop().await.expect("Failed to stop client");
}
