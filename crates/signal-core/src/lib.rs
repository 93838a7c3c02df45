//! Signal-core: Wire protocol for the calldesk realtime signaling channel
//!
//! This crate defines the message vocabulary exchanged over the persistent
//! duplex channel between an operator client and the calldesk backend. It is
//! pure data: frame envelope, outbound commands, inbound authoritative
//! events, and their typed payloads. No I/O lives here.
//!
//! ## Proper Layer Separation
//! ```text
//! client-core -> signal-core
//! ```
//!
//! Signal-core focuses on:
//! - The `{event, seq, payload}` frame envelope
//! - Outbound command names and payload shapes
//! - Inbound authoritative event names and payload shapes
//! - Server sequence numbers used for conflict resolution
//!
//! Connection lifecycle, call state tracking, and reconciliation are handled
//! by client-core.

pub mod command;
pub mod event;
pub mod frame;

// Public API exports
pub use command::{
    AgentStatus, AgentStatusPayload, CallPriorityPayload, CallTargetPayload, ClientCommand,
    InitiateCallPayload, MutePayload, RouteCallPayload,
};
pub use event::{
    CallDirection, CallSessionPayload, CallStatus, CallerInfo, EventKind, IncomingCallPayload,
    MuteStatePayload, ServerEvent,
};
pub use frame::{CallId, Frame, WireError};

/// Signal-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
