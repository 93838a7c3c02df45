//! Client-core: Realtime call-session signaling client
//!
//! This crate provides the client-side signaling layer for calldesk
//! operator consoles: joining and leaving call sessions, tracking mute and
//! video state, and reconciling optimistic local state against the
//! authoritative events the backend pushes over a persistent duplex
//! channel.
//!
//! ## Proper Layer Separation
//! ```text
//! console UI -> client-core -> signal-core (wire types)
//! ```
//!
//! Client-core focuses on:
//! - Connection lifecycle for the single signaling channel (bearer
//!   credential, bounded reconnect/backoff, explicit subscriptions)
//! - The single call session state machine and its operations
//! - Optimistic mutations with sequence-based reconciliation and
//!   timeout-driven reverts
//! - Event delivery for UI integration
//!
//! Call routing, queueing, agent assignment, and media transport live in
//! the backend service; this crate only speaks the signaling contract.

pub mod auth;
pub mod call;
pub mod client;
pub mod connection;
pub mod error;
pub mod events;
pub mod transport;

// Public API exports (only high-level client-core types)
pub use auth::{AuthClient, SessionCredential, UserInfo};
pub use call::{CallDirection, CallId, CallSession, CallState, MutationField};
pub use client::{
    CallCapabilities, CallClient, ClientBuilder, ClientConfig, ClientStats, RetryConfig,
};
pub use connection::{
    ConnectionConfig, ConnectionManager, ConnectionState, SignalSubscription, SubscriptionToken,
};
pub use error::{ClientError, ClientResult};
pub use events::{
    CallAction, CallStatusInfo, ClientEvent, ClientEventHandler, EventFilter, EventPriority,
    EventSubscription, IncomingCallInfo, MutationRevertInfo, MuteStatusInfo, QueueEventInfo,
    QueueEventKind,
};
pub use transport::{Transport, WebSocketTransport};

// Re-export commonly used wire types from signal-core (for convenience)
pub use calldesk_signal_core::{AgentStatus, ClientCommand, EventKind, ServerEvent};

/// Client-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
