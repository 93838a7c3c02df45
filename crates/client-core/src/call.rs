//! Call session tracking for the signaling client
//!
//! This module provides the call session structure and lightweight state
//! helpers. A client holds at most one session at a time; "no call" is the
//! absence of a session, and every mutation goes through the operations on
//! [`crate::CallClient`] — no other component writes these fields directly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use chrono::{DateTime, Utc};

pub use calldesk_signal_core::{CallDirection, CallId};

/// Current state of the call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// Call is being set up (outbound dial or answered ring in flight)
    Connecting,
    /// Inbound call waiting for the operator's decision
    Ringing,
    /// Both parties joined, call is live
    Active,
    /// Call has ended; the session is about to be dropped
    Ended,
}

impl CallState {
    /// Check if the call is live
    pub fn is_active(&self) -> bool {
        matches!(self, CallState::Active)
    }

    /// Check if the call is over
    pub fn is_terminated(&self) -> bool {
        matches!(self, CallState::Ended)
    }

    /// Check if the call is still in progress
    pub fn is_in_progress(&self) -> bool {
        !self.is_terminated()
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallState::Connecting => "connecting",
            CallState::Ringing => "ringing",
            CallState::Active => "active",
            CallState::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// Mutable call field subject to optimistic mutation and reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationField {
    AudioMuted,
    VideoMuted,
}

impl std::fmt::Display for MutationField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MutationField::AudioMuted => "audio_muted",
            MutationField::VideoMuted => "video_muted",
        };
        f.write_str(s)
    }
}

/// The single call the local client is currently part of
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    /// Backend-assigned identifier; unknown while an outbound call is
    /// still waiting for its `joined-call`
    pub call_id: Option<CallId>,
    /// Direction of the call
    pub direction: CallDirection,
    /// Display number of the other party (if known)
    pub counterpart_number: Option<String>,
    /// Current state of the session
    pub state: CallState,
    /// Local audio mute flag
    pub audio_muted: bool,
    /// Local video mute flag
    pub video_muted: bool,
    /// When the session was created locally
    pub created_at: DateTime<Utc>,
    /// When the call went active (if it did)
    pub connected_at: Option<DateTime<Utc>>,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
}

impl CallSession {
    /// New outbound session in the connecting state (id not yet assigned)
    pub fn outbound(callee_number: impl Into<String>) -> Self {
        Self {
            call_id: None,
            direction: CallDirection::Outbound,
            counterpart_number: Some(callee_number.into()),
            state: CallState::Connecting,
            audio_muted: false,
            video_muted: false,
            created_at: Utc::now(),
            connected_at: None,
            metadata: HashMap::new(),
        }
    }

    /// New inbound session ringing for the operator
    pub fn inbound(call_id: CallId, caller_number: Option<String>) -> Self {
        Self {
            call_id: Some(call_id),
            direction: CallDirection::Inbound,
            counterpart_number: caller_number,
            state: CallState::Ringing,
            audio_muted: false,
            video_muted: false,
            created_at: Utc::now(),
            connected_at: None,
            metadata: HashMap::new(),
        }
    }

    /// Whether this session is the one the given id refers to
    pub fn matches(&self, call_id: &CallId) -> bool {
        self.call_id.as_ref() == Some(call_id)
    }

    /// Read a mutable flag by field
    pub fn mute_flag(&self, field: MutationField) -> bool {
        match field {
            MutationField::AudioMuted => self.audio_muted,
            MutationField::VideoMuted => self.video_muted,
        }
    }

    /// Write a mutable flag by field
    pub fn set_mute_flag(&mut self, field: MutationField, value: bool) {
        match field {
            MutationField::AudioMuted => self.audio_muted = value,
            MutationField::VideoMuted => self.video_muted = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_session_starts_connecting_without_id() {
        let session = CallSession::outbound("+15550100");
        assert_eq!(session.state, CallState::Connecting);
        assert!(session.call_id.is_none());
        assert_eq!(session.direction, CallDirection::Outbound);
        assert!(!session.audio_muted);
    }

    #[test]
    fn matches_requires_assigned_id() {
        let session = CallSession::outbound("+15550100");
        assert!(!session.matches(&CallId::from("c1")));

        let ringing = CallSession::inbound(CallId::from("c1"), None);
        assert!(ringing.matches(&CallId::from("c1")));
        assert!(!ringing.matches(&CallId::from("c2")));
    }
}
