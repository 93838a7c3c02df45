//! Connection manager for the signaling channel
//!
//! Owns the single duplex channel to the backend signaling endpoint. The
//! manager runs a background task that dials the endpoint with the current
//! bearer credential, reconnects with bounded exponential backoff on
//! transient failures, and routes decoded inbound events to subscribers.
//!
//! # Contract
//!
//! - At most one live channel per authenticated session; `open()` with the
//!   credential already in use is a no-op, `open()` with a new credential
//!   replaces the channel.
//! - `send()` is fire-and-forget: the channel has no acknowledgement
//!   envelope, so delivery is only observable through the authoritative
//!   events the server pushes back.
//! - Credential rejection parks the manager in [`ConnectionState::Error`]
//!   and stops retrying; the auth collaborator refreshes the credential and
//!   calls `open()` again. Transient failures retry up to the configured
//!   ceiling, then park in `Error` as well — unbounded silent retry is not
//!   allowed.
//! - Subscriptions carry explicit tokens and survive reconnects; they are
//!   only removed by `unsubscribe()` or when the receiver is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::recovery::RetryConfig;
use crate::error::{ClientError, ClientResult};
use crate::transport::{MessageSink, MessageStream, Transport, TransportMessage, TransportPair};
use calldesk_signal_core::{ClientCommand, EventKind, Frame, ServerEvent};

/// State of the duplex channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel and no dial in progress
    Disconnected,
    /// Dialing (or backing off between attempts)
    Connecting,
    /// Channel established and authenticated
    Connected,
    /// Parked after credential rejection or retry exhaustion
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Unsubscribe token returned by `subscribe`/`subscribe_all`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionToken {
    id: Uuid,
    kind: Option<EventKind>,
}

/// An inbound event subscription
///
/// Dropping the subscription (or its receiver) detaches it; explicit
/// [`ConnectionManager::unsubscribe`] with the token does the same.
pub struct SignalSubscription {
    token: SubscriptionToken,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl SignalSubscription {
    /// The unsubscribe token for this subscription
    pub fn token(&self) -> SubscriptionToken {
        self.token.clone()
    }

    /// Receive the next event, `None` once detached
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx.recv().await
    }
}

/// Subscriber registry shared between the manager handle and its task
#[derive(Default)]
struct SubscriberRegistry {
    keyed: DashMap<EventKind, Vec<(Uuid, mpsc::UnboundedSender<ServerEvent>)>>,
    wildcard: DashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>,
}

impl SubscriberRegistry {
    fn subscribe(&self, kind: Option<EventKind>) -> SignalSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        match kind {
            Some(kind) => self.keyed.entry(kind).or_default().push((id, tx)),
            None => {
                self.wildcard.insert(id, tx);
            }
        }
        SignalSubscription {
            token: SubscriptionToken { id, kind },
            rx,
        }
    }

    fn unsubscribe(&self, token: &SubscriptionToken) {
        match token.kind {
            Some(kind) => {
                if let Some(mut list) = self.keyed.get_mut(&kind) {
                    list.retain(|(id, _)| *id != token.id);
                }
            }
            None => {
                self.wildcard.remove(&token.id);
            }
        }
    }

    /// Deliver one event to every matching subscriber, pruning dead ones
    fn deliver(&self, event: &ServerEvent) {
        if let Some(mut list) = self.keyed.get_mut(&event.kind()) {
            list.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        }
        self.wildcard
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    fn clear(&self) {
        self.keyed.clear();
        self.wildcard.clear();
    }
}

/// Configuration for the connection manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Full WebSocket URL of the signaling endpoint
    pub url: String,
    /// Reconnect schedule (bounded)
    pub retry: RetryConfig,
}

enum ControlMessage {
    Open { bearer_token: String },
    Close,
    Shutdown,
}

/// Manager for the single signaling channel
pub struct ConnectionManager {
    control_tx: mpsc::UnboundedSender<ControlMessage>,
    outbound_tx: mpsc::UnboundedSender<Frame>,
    state_rx: watch::Receiver<ConnectionState>,
    registry: Arc<SubscriberRegistry>,
    last_seq: Arc<AtomicU64>,
    credential: RwLock<Option<String>>,
    task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create the manager and spawn its background connection task
    ///
    /// No dialing happens until the first `open()`.
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let registry = Arc::new(SubscriberRegistry::default());
        let last_seq = Arc::new(AtomicU64::new(0));

        let ctx = LoopContext {
            config,
            transport,
            state_tx,
            registry: registry.clone(),
            last_seq: last_seq.clone(),
        };

        let task = tokio::spawn(run_connection_loop(ctx, control_rx, outbound_rx));

        Self {
            control_tx,
            outbound_tx,
            state_rx,
            registry,
            last_seq,
            credential: RwLock::new(None),
            task: std::sync::Mutex::new(Some(task)),
        }
    }

    /// Open the channel with the given bearer credential
    ///
    /// Idempotent: if a channel already exists (or is dialing) for the same
    /// credential this is a no-op. A different credential replaces the
    /// existing channel. Returns immediately; progress is observable through
    /// the state watch.
    pub async fn open(&self, bearer_token: &str) {
        let mut credential = self.credential.write().await;
        let state = self.state();
        if credential.as_deref() == Some(bearer_token)
            && matches!(
                state,
                ConnectionState::Connecting | ConnectionState::Connected
            )
        {
            debug!("open() with the live credential, nothing to do");
            return;
        }
        *credential = Some(bearer_token.to_string());
        let _ = self.control_tx.send(ControlMessage::Open {
            bearer_token: bearer_token.to_string(),
        });
    }

    /// Tear down the channel immediately
    ///
    /// Subsequent `send` calls fail with [`ClientError::NotConnected`] until
    /// `open` succeeds again.
    pub async fn close(&self) {
        *self.credential.write().await = None;
        let _ = self.control_tx.send(ControlMessage::Close);
    }

    /// Transmit a command on the channel (fire-and-forget)
    ///
    /// Fails synchronously with [`ClientError::NotConnected`] when no
    /// channel is active. Callers treat failures as "reported, not thrown":
    /// log and move on, delivery is never guaranteed anyway.
    pub fn send(&self, command: &ClientCommand) -> ClientResult<()> {
        if self.state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let frame = command.to_frame()?;
        self.outbound_tx
            .send(frame)
            .map_err(|_| ClientError::ConnectionClosed {
                reason: "connection task stopped".to_string(),
            })
    }

    /// Subscribe to one inbound event kind
    pub fn subscribe(&self, kind: EventKind) -> SignalSubscription {
        self.registry.subscribe(Some(kind))
    }

    /// Subscribe to every decoded inbound event
    pub fn subscribe_all(&self) -> SignalSubscription {
        self.registry.subscribe(None)
    }

    /// Remove a subscription by token
    pub fn unsubscribe(&self, token: &SubscriptionToken) {
        self.registry.unsubscribe(token);
    }

    /// Current channel state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch channel state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Highest server sequence number observed on this connection
    pub fn last_seq(&self) -> u64 {
        self.last_seq.load(Ordering::SeqCst)
    }

    /// Stop the background task and drop all subscriptions
    pub fn shutdown(&self) {
        let _ = self.control_tx.send(ControlMessage::Shutdown);
        self.registry.clear();
        if let Ok(mut guard) = self.task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.control_tx.send(ControlMessage::Shutdown);
    }
}

struct LoopContext {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    state_tx: watch::Sender<ConnectionState>,
    registry: Arc<SubscriberRegistry>,
    last_seq: Arc<AtomicU64>,
}

impl LoopContext {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
    }
}

enum DialOutcome {
    Connected(TransportPair),
    AuthRejected,
    Exhausted,
    Superseded(String),
    Closed,
    Shutdown,
}

enum MessageLoopExit {
    Shutdown,
    Closed,
    Superseded(String),
    ConnectionLost,
}

/// Main connection loop: idle until a credential arrives, then dial with
/// bounded backoff, run the message loop, and decide whether to redial.
async fn run_connection_loop(
    ctx: LoopContext,
    mut control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    mut outbound_rx: mpsc::UnboundedReceiver<Frame>,
) {
    let mut token: Option<String> = None;

    loop {
        let current = match token.clone() {
            Some(t) => t,
            None => {
                // Idle until someone opens the connection
                match control_rx.recv().await {
                    Some(ControlMessage::Open { bearer_token }) => {
                        token = Some(bearer_token.clone());
                        bearer_token
                    }
                    Some(ControlMessage::Close) => {
                        ctx.set_state(ConnectionState::Disconnected);
                        continue;
                    }
                    Some(ControlMessage::Shutdown) | None => break,
                }
            }
        };

        match dial_with_backoff(&ctx, &current, &mut control_rx).await {
            DialOutcome::Connected((sink, stream)) => {
                info!(url = %ctx.config.url, "signaling channel connected");
                ctx.set_state(ConnectionState::Connected);

                match run_message_loop(&ctx, sink, stream, &mut control_rx, &mut outbound_rx)
                    .await
                {
                    MessageLoopExit::Shutdown => break,
                    MessageLoopExit::Closed => {
                        token = None;
                        ctx.set_state(ConnectionState::Disconnected);
                    }
                    MessageLoopExit::Superseded(new_token) => {
                        token = Some(new_token);
                        ctx.set_state(ConnectionState::Disconnected);
                    }
                    MessageLoopExit::ConnectionLost => {
                        // Keep the credential; the outer loop redials
                        ctx.set_state(ConnectionState::Disconnected);
                    }
                }
            }
            DialOutcome::AuthRejected => {
                token = None;
                ctx.set_state(ConnectionState::Error);
            }
            DialOutcome::Exhausted => {
                token = None;
                ctx.set_state(ConnectionState::Error);
            }
            DialOutcome::Superseded(new_token) => {
                token = Some(new_token);
            }
            DialOutcome::Closed => {
                token = None;
                ctx.set_state(ConnectionState::Disconnected);
            }
            DialOutcome::Shutdown => break,
        }
    }

    ctx.set_state(ConnectionState::Disconnected);
    debug!("connection loop exited");
}

/// Dial the endpoint, retrying transient failures on the configured
/// schedule. Stays responsive to control messages while backing off.
async fn dial_with_backoff(
    ctx: &LoopContext,
    bearer_token: &str,
    control_rx: &mut mpsc::UnboundedReceiver<ControlMessage>,
) -> DialOutcome {
    let retry = &ctx.config.retry;
    let mut attempt: u32 = 0;
    let mut delay = retry.initial_delay;

    loop {
        ctx.set_state(ConnectionState::Connecting);
        attempt += 1;

        match ctx.transport.connect(&ctx.config.url, bearer_token).await {
            Ok(pair) => return DialOutcome::Connected(pair),
            Err(e) if e.is_auth_error() => {
                warn!(error = %e, "credential rejected by signaling endpoint");
                return DialOutcome::AuthRejected;
            }
            Err(e) => {
                if attempt >= retry.max_attempts {
                    warn!(
                        error = %e,
                        attempts = attempt,
                        "connect failed after all retry attempts"
                    );
                    return DialOutcome::Exhausted;
                }

                let wait = retry.jittered(delay);
                warn!(
                    error = %e,
                    attempt = attempt,
                    next_delay_ms = wait.as_millis() as u64,
                    "transient connect failure, will retry"
                );

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    msg = control_rx.recv() => match msg {
                        Some(ControlMessage::Open { bearer_token }) => {
                            return DialOutcome::Superseded(bearer_token);
                        }
                        Some(ControlMessage::Close) => return DialOutcome::Closed,
                        Some(ControlMessage::Shutdown) | None => return DialOutcome::Shutdown,
                    }
                }

                delay = retry.next_delay(delay);
            }
        }
    }
}

/// Pump one established channel: route inbound frames, flush outbound
/// frames, answer pings, and react to control messages.
async fn run_message_loop(
    ctx: &LoopContext,
    mut sink: Box<dyn MessageSink>,
    mut stream: Box<dyn MessageStream>,
    control_rx: &mut mpsc::UnboundedReceiver<ControlMessage>,
    outbound_rx: &mut mpsc::UnboundedReceiver<Frame>,
) -> MessageLoopExit {
    loop {
        tokio::select! {
            msg = stream.recv() => match msg {
                Some(Ok(TransportMessage::Text(text))) => handle_text_frame(ctx, &text),
                Some(Ok(TransportMessage::Ping(data))) => {
                    let _ = sink.send_pong(data).await;
                }
                Some(Ok(TransportMessage::Pong(_))) => {}
                Some(Ok(TransportMessage::Close { code, reason })) => {
                    info!(code = code, reason = %reason, "channel closed by server");
                    return MessageLoopExit::ConnectionLost;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "channel read error");
                    return MessageLoopExit::ConnectionLost;
                }
                None => {
                    info!("channel stream ended");
                    return MessageLoopExit::ConnectionLost;
                }
            },

            Some(frame) = outbound_rx.recv() => {
                match frame.encode() {
                    Ok(text) => {
                        if let Err(e) = sink.send_text(&text).await {
                            warn!(error = %e, event = %frame.event, "send failed, dropping channel");
                            return MessageLoopExit::ConnectionLost;
                        }
                        debug!(event = %frame.event, "command sent");
                    }
                    Err(e) => {
                        // Reported, not thrown: the command is simply lost
                        warn!(error = %e, event = %frame.event, "failed to encode command");
                    }
                }
            },

            msg = control_rx.recv() => match msg {
                Some(ControlMessage::Open { bearer_token }) => {
                    let _ = sink.close().await;
                    return MessageLoopExit::Superseded(bearer_token);
                }
                Some(ControlMessage::Close) => {
                    let _ = sink.close().await;
                    return MessageLoopExit::Closed;
                }
                Some(ControlMessage::Shutdown) | None => {
                    let _ = sink.close().await;
                    return MessageLoopExit::Shutdown;
                }
            },
        }
    }
}

/// Decode one inbound text frame and fan it out to subscribers
///
/// Unknown events and malformed payloads are logged and skipped; they must
/// never take the reconciliation loop down.
fn handle_text_frame(ctx: &LoopContext, text: &str) {
    let frame = match Frame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "dropping malformed frame");
            return;
        }
    };

    match ServerEvent::from_frame(&frame) {
        Ok(event) => {
            ctx.last_seq.fetch_max(event.seq(), Ordering::SeqCst);
            debug!(event = %frame.event, seq = event.seq(), "event received");
            ctx.registry.deliver(&event);
        }
        Err(e) if e.is_unknown_event() => {
            debug!(event = %frame.event, "ignoring unknown event");
        }
        Err(e) => {
            warn!(error = %e, event = %frame.event, "dropping malformed event payload");
        }
    }
}
