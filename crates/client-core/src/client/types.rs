//! Type definitions for the client-core library
//!
//! Shared data structures for client operations: statistics and per-state
//! call capabilities.

use crate::connection::ConnectionState;

/// Statistics about the client's current state and activity
#[derive(Debug, Clone)]
pub struct ClientStats {
    /// Whether the client is currently running and processing events
    pub is_running: bool,
    /// Current signaling channel state
    pub connection_state: ConnectionState,
    /// Total number of calls handled since the client started
    pub total_calls: usize,
    /// Whether a call session currently exists
    pub in_call: bool,
    /// Number of optimistic mutations awaiting confirmation
    pub pending_mutations: usize,
}

/// Operations currently possible for the call session in its present state
///
/// Unlike the static command vocabulary, this reflects what the single
/// session can do right now.
#[derive(Debug, Clone)]
pub struct CallCapabilities {
    /// Whether a ringing inbound call can be answered
    pub can_answer: bool,
    /// Whether the call can be terminated
    pub can_end: bool,
    /// Whether audio can be muted/unmuted
    pub can_mute_audio: bool,
    /// Whether video can be muted/unmuted
    pub can_mute_video: bool,
}

impl Default for CallCapabilities {
    fn default() -> Self {
        Self {
            can_answer: false,
            can_end: false,
            can_mute_audio: false,
            can_mute_video: false,
        }
    }
}
