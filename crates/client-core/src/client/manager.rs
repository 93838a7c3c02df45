//! High-level signaling client manager
//!
//! The `CallClient` is the primary entry point: it owns the connection
//! manager, the single call session, the optimistic reconciler, and the
//! event system, and runs the background tasks that tie them together.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐
//! │   Operator Console      │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │   CallClient            │ ◄── This Layer
//! │ ┌─────────────────────┐ │
//! │ │ Call Operations     │ │  • start/answer/end, mute toggles
//! │ │ Session Tracking    │ │  • single CallSession owner
//! │ │ Reconciliation      │ │  • pending mutations, timeouts
//! │ │ Event Broadcasting  │ │  • broadcast + handler delivery
//! │ └─────────────────────┘ │
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐
//! │   ConnectionManager     │
//! │  duplex channel (WS)    │
//! └─────────────────────────┘
//! ```
//!
//! Three background tasks run while the client is started:
//!
//! - **dispatch** — feeds decoded inbound events to the signal handler;
//! - **sweep** — expires unconfirmed optimistic mutations on a fixed tick;
//! - **monitor** — watches connection transitions, emits connection events,
//!   sweeps immediately after a reconnect, and declares the call
//!   interrupted when the channel stays down past the threshold.
//!
//! All three are cancelled synchronously by [`CallClient::stop`], so no
//! timer fires after teardown.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::auth::SessionCredential;
use crate::call::CallSession;
use crate::connection::{ConnectionConfig, ConnectionManager, ConnectionState};
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, ClientEventHandler, EventPriority};
use crate::transport::{Transport, WebSocketTransport};

use super::config::ClientConfig;
use super::events::ClientSignalHandler;
use super::reconciler::Reconciler;
use super::types::ClientStats;

/// High-level signaling client that coordinates all operations
pub struct CallClient {
    /// Client configuration
    pub(crate) config: ClientConfig,
    /// The single duplex channel
    pub(crate) connection: Arc<ConnectionManager>,
    /// The single call session (None = idle)
    pub(crate) session: Arc<RwLock<Option<CallSession>>>,
    /// Pending optimistic mutations
    pub(crate) reconciler: Arc<Reconciler>,
    /// Bridge from wire events to client events
    pub(crate) signal_handler: Arc<ClientSignalHandler>,
    /// Event broadcast channel
    pub(crate) event_tx: broadcast::Sender<ClientEvent>,
    /// Whether the client is running
    pub(crate) is_running: Arc<RwLock<bool>>,
    /// Statistics
    pub(crate) stats: Arc<Mutex<ClientStats>>,
    /// Authenticated user's id (matches mute confirmations to self)
    pub(crate) local_user_id: Arc<RwLock<Option<String>>>,
    /// Background task handles, aborted on stop
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl CallClient {
    /// Create a new client with the production WebSocket transport
    pub fn new(config: ClientConfig) -> ClientResult<Arc<Self>> {
        Self::with_transport(config, Arc::new(WebSocketTransport::new()))
    }

    /// Create a new client over a custom transport (used by tests)
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> ClientResult<Arc<Self>> {
        if config.server_url.is_empty() {
            return Err(ClientError::MissingConfiguration {
                field: "server_url".to_string(),
            });
        }

        let connection = Arc::new(ConnectionManager::new(
            ConnectionConfig {
                url: config.signaling_url(),
                retry: config.reconnect.clone(),
            },
            transport,
        ));

        let session = Arc::new(RwLock::new(None));
        let reconciler = Arc::new(Reconciler::new(config.mutation_timeout));
        let (event_tx, _) = broadcast::channel(config.event_buffer);
        let stats = Arc::new(Mutex::new(ClientStats {
            is_running: false,
            connection_state: ConnectionState::Disconnected,
            total_calls: 0,
            in_call: false,
            pending_mutations: 0,
        }));
        let local_user_id = Arc::new(RwLock::new(None));

        let signal_handler = Arc::new(ClientSignalHandler {
            session: session.clone(),
            reconciler: reconciler.clone(),
            connection: connection.clone(),
            event_tx: event_tx.clone(),
            client_event_handler: Arc::new(RwLock::new(None)),
            local_user_id: local_user_id.clone(),
            stats: stats.clone(),
        });

        Ok(Arc::new(Self {
            config,
            connection,
            session,
            reconciler,
            signal_handler,
            event_tx,
            is_running: Arc::new(RwLock::new(false)),
            stats,
            local_user_id,
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Start the client with the given session credential
    ///
    /// Opens the signaling channel and spawns the dispatch/sweep/monitor
    /// tasks. Idempotent while already running.
    pub async fn start(&self, credential: &SessionCredential) -> ClientResult<()> {
        {
            let mut running = self.is_running.write().await;
            if *running {
                debug!("client already running");
                return Ok(());
            }
            *running = true;
        }

        *self.local_user_id.write().await = Some(credential.user_id.clone());

        // Subscribe before dialing so no early event is lost
        let mut subscription = self.connection.subscribe_all();
        self.connection.open(&credential.access_token).await;

        let mut tasks = self.tasks.lock().await;

        // Dispatch: wire events -> signal handler
        {
            let handler = self.signal_handler.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = subscription.recv().await {
                    handler.handle_event(event).await;
                }
                debug!("dispatch task finished");
            }));
        }

        // Sweep: revert expired optimistic mutations
        {
            let handler = self.signal_handler.clone();
            let mut tick = tokio::time::interval(self.config.sweep_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tasks.push(tokio::spawn(async move {
                loop {
                    tick.tick().await;
                    handler.sweep_expired().await;
                }
            }));
        }

        // Monitor: connection transitions and interruption threshold
        {
            let handler = self.signal_handler.clone();
            let session = self.session.clone();
            let mut state_rx = self.connection.watch_state();
            let threshold = self.config.interruption_threshold;
            tasks.push(tokio::spawn(async move {
                let mut down_since: Option<tokio::time::Instant> = None;
                let mut check = tokio::time::interval(std::time::Duration::from_millis(250));
                check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // Deliver the current state immediately on startup
                state_rx.mark_changed();

                loop {
                    tokio::select! {
                        changed = state_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let state = *state_rx.borrow();
                            let priority = match state {
                                ConnectionState::Error => EventPriority::Critical,
                                ConnectionState::Connected => EventPriority::Normal,
                                _ => EventPriority::Low,
                            };
                            handler
                                .emit(ClientEvent::ConnectionStateChanged {
                                    state,
                                    reason: None,
                                    priority,
                                })
                                .await;

                            match state {
                                ConnectionState::Connected => {
                                    down_since = None;
                                    // Anything issued before the outage is
                                    // unconfirmed; revert what has expired
                                    handler.sweep_expired().await;
                                }
                                // Rapid transitions coalesce in the watch
                                // channel, so any non-connected observation
                                // starts the interruption clock
                                ConnectionState::Disconnected
                                | ConnectionState::Connecting
                                | ConnectionState::Error => {
                                    if down_since.is_none() {
                                        down_since = Some(tokio::time::Instant::now());
                                    }
                                }
                            }
                        }
                        _ = check.tick() => {
                            if let Some(since) = down_since {
                                if since.elapsed() >= threshold
                                    && session.read().await.is_some()
                                {
                                    handler.force_interrupt().await;
                                    down_since = None;
                                }
                            }
                        }
                    }
                }
            }));
        }

        info!(url = %self.config.signaling_url(), "client started");
        Ok(())
    }

    /// Re-open the channel with a refreshed access token
    ///
    /// Called by the auth collaborator after a credential refresh; a new
    /// token replaces the channel, the same token is a no-op.
    pub async fn update_credential(&self, access_token: &str) {
        self.connection.open(access_token).await;
    }

    /// Stop the client
    ///
    /// Closes the channel, resets the call session, drops all pending
    /// mutations, and cancels every background task — nothing fires after
    /// this returns.
    pub async fn stop(&self) -> ClientResult<()> {
        {
            let mut running = self.is_running.write().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        self.connection.close().await;
        self.signal_handler.teardown().await;

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }

        info!("client stopped");
        Ok(())
    }

    /// Register the event handler invoked for every client event
    pub async fn set_event_handler(&self, handler: Arc<dyn ClientEventHandler>) {
        self.signal_handler.set_event_handler(handler).await;
    }

    /// Subscribe to the client event broadcast
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    /// Whether the client is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Current signaling channel state
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Snapshot of client statistics
    pub async fn get_client_stats(&self) -> ClientStats {
        let mut stats = self.stats.lock().await.clone();
        stats.is_running = *self.is_running.read().await;
        stats.connection_state = self.connection.state();
        stats.in_call = self.session.read().await.is_some();
        stats.pending_mutations = self.reconciler.len();
        stats
    }

    /// Fire a command on the channel, reporting (not raising) send failures
    ///
    /// The channel has no delivery guarantee either way, so callers treat
    /// a failed send exactly like a lost frame: the reconciler or the
    /// server's authoritative events decide what actually happened.
    pub(crate) fn send_lossy(&self, command: &calldesk_signal_core::ClientCommand) {
        if let Err(e) = self.connection.send(command) {
            warn!(
                event = command.event_name(),
                error = %e,
                "command not sent"
            );
        }
    }
}

impl std::fmt::Debug for CallClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallClient")
            .field("server_url", &self.config.server_url)
            .field("connection_state", &self.connection.state())
            .finish_non_exhaustive()
    }
}
