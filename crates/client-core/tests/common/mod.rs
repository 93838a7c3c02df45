//! Shared test helpers: a channel-backed transport double and polling
//! utilities.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use calldesk_client_core::transport::{
    MessageSink, MessageStream, Transport, TransportMessage, TransportPair,
};
use calldesk_client_core::{ClientError, ClientResult};

/// Transport double: every `connect` yields a fresh in-memory channel pair
/// and hands the server side to the test through the connections receiver.
pub struct MockTransport {
    connections_tx: mpsc::UnboundedSender<ServerHandle>,
    reject_auth: AtomicBool,
    refuse_connect: AtomicBool,
    dial_attempts: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerHandle>) {
        let (connections_tx, connections_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                connections_tx,
                reject_auth: AtomicBool::new(false),
                refuse_connect: AtomicBool::new(false),
                dial_attempts: AtomicUsize::new(0),
            }),
            connections_rx,
        )
    }

    /// Make subsequent dials fail like a 401 handshake
    pub fn set_reject_auth(&self, reject: bool) {
        self.reject_auth.store(reject, Ordering::SeqCst);
    }

    /// Make subsequent dials fail like a refused TCP connect
    pub fn set_refuse_connect(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// How many dials have been attempted so far
    pub fn dial_attempts(&self) -> usize {
        self.dial_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _url: &str, bearer_token: &str) -> ClientResult<TransportPair> {
        self.dial_attempts.fetch_add(1, Ordering::SeqCst);
        if self.reject_auth.load(Ordering::SeqCst) {
            return Err(ClientError::authentication_failed("handshake rejected: 401"));
        }
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(ClientError::network_error("connection refused"));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let _ = self.connections_tx.send(ServerHandle {
            inbound: inbound_tx,
            outbound: outbound_rx,
            bearer_token: bearer_token.to_string(),
        });

        Ok((
            Box::new(MockSink { tx: outbound_tx }),
            Box::new(MockStream { rx: inbound_rx }),
        ))
    }
}

/// Server side of one mock connection
pub struct ServerHandle {
    inbound: mpsc::UnboundedSender<TransportMessage>,
    outbound: mpsc::UnboundedReceiver<String>,
    pub bearer_token: String,
}

impl ServerHandle {
    /// Push an authoritative event frame to the client
    pub fn push_event(&self, event: &str, seq: u64, payload: serde_json::Value) {
        let frame = serde_json::json!({
            "event": event,
            "seq": seq,
            "payload": payload,
        });
        let _ = self
            .inbound
            .send(TransportMessage::Text(frame.to_string()));
    }

    /// Push a raw text frame (malformed input tests)
    pub fn push_raw(&self, text: &str) {
        let _ = self.inbound.send(TransportMessage::Text(text.to_string()));
    }

    /// Drop the connection from the server side
    pub fn disconnect(&self) {
        let _ = self.inbound.send(TransportMessage::Close {
            code: 1001,
            reason: "going away".to_string(),
        });
    }

    /// Await the next outbound command with the given event name,
    /// returning its payload. Skips unrelated commands.
    pub async fn expect_command(&mut self, event: &str) -> serde_json::Value {
        loop {
            let text = tokio::time::timeout(Duration::from_secs(2), self.outbound.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for '{event}' command"))
                .expect("outbound channel closed");
            let frame: serde_json::Value =
                serde_json::from_str(&text).expect("outbound frame is valid JSON");
            if frame["event"] == event {
                return frame["payload"].clone();
            }
        }
    }

    /// Non-blocking peek at the next outbound command, if any
    pub fn try_next_command(&mut self) -> Option<serde_json::Value> {
        self.outbound
            .try_recv()
            .ok()
            .map(|text| serde_json::from_str(&text).expect("outbound frame is valid JSON"))
    }
}

struct MockSink {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl MessageSink for MockSink {
    async fn send_text(&mut self, text: &str) -> ClientResult<()> {
        self.tx
            .send(text.to_string())
            .map_err(|_| ClientError::network_error("peer gone"))
    }

    async fn send_pong(&mut self, _data: Vec<u8>) -> ClientResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> ClientResult<()> {
        Ok(())
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<TransportMessage>,
}

#[async_trait]
impl MessageStream for MockStream {
    async fn recv(&mut self) -> Option<ClientResult<TransportMessage>> {
        self.rx.recv().await.map(Ok)
    }
}

/// Poll an async condition until it holds or the timeout passes
pub async fn wait_until<F, Fut>(what: &str, timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Initialize tracing for tests
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("calldesk_client_core=debug")
        .with_test_writer()
        .try_init();
}
