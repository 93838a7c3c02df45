//! Inbound authoritative events pushed by the server
//!
//! Server events are ground truth: once correctly sequenced they always
//! override local optimistic state. Every server frame carries a `seq`
//! number; consumers must compare sequence numbers, not arrival order, when
//! reconciling against locally pending mutations.
//!
//! Unknown event names decode to [`WireError::UnknownEvent`] so consumers
//! can log and skip them without dropping the connection — newer backends
//! may emit events this client does not know about.

use serde::{Deserialize, Serialize};

use crate::command::AgentStatus;
use crate::frame::{CallId, Frame, WireError};

/// Direction of a call from the operator's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Operator initiated the call
    Outbound,
    /// Call arrived from the network
    Inbound,
}

/// Call status as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Waiting for a party to answer
    Ringing,
    /// Both parties joined, media flowing
    Active,
}

/// Call session object carried by `joined-call`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSessionPayload {
    pub call_id: CallId,
    #[serde(default)]
    pub direction: Option<CallDirection>,
    #[serde(default)]
    pub counterpart_number: Option<String>,
    pub status: CallStatus,
    #[serde(default)]
    pub audio_muted: bool,
    #[serde(default)]
    pub video_muted: bool,
}

/// Mute confirmation carried by `audio-muted` / `video-muted`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteStatePayload {
    /// User whose mute state changed; only events for the local user
    /// confirm or revert a pending mutation
    pub user_id: String,
    pub call_id: CallId,
    pub muted: bool,
}

/// Caller details nested inside `call.incoming`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerInfo {
    #[serde(default)]
    pub caller_number: Option<String>,
    #[serde(default)]
    pub caller_name: Option<String>,
}

/// Payload of `call.incoming`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallPayload {
    pub call_id: CallId,
    #[serde(default)]
    pub caller_info: Option<CallerInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallRefPayload {
    call_id: CallId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallEndedPayload {
    call_id: CallId,
    #[serde(default)]
    duration: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallAnsweredPayload {
    call_id: CallId,
    #[serde(default)]
    agent_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallQueuedPayload {
    call_id: CallId,
    queue_position: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallAssignedPayload {
    call_id: CallId,
    #[serde(default)]
    agent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentStatusChangedPayload {
    agent_id: String,
    status: AgentStatus,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorPayload {
    message: String,
}

/// Routing key for inbound events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    JoinedCall,
    LeftCall,
    CallEnded,
    AudioMuted,
    VideoMuted,
    CallIncoming,
    CallAnswered,
    QueueUpdated,
    CallQueued,
    CallAssigned,
    AgentStatusChanged,
    Error,
}

impl EventKind {
    /// All kinds this client understands
    pub const ALL: &'static [EventKind] = &[
        EventKind::JoinedCall,
        EventKind::LeftCall,
        EventKind::CallEnded,
        EventKind::AudioMuted,
        EventKind::VideoMuted,
        EventKind::CallIncoming,
        EventKind::CallAnswered,
        EventKind::QueueUpdated,
        EventKind::CallQueued,
        EventKind::CallAssigned,
        EventKind::AgentStatusChanged,
        EventKind::Error,
    ];

    /// Wire name for this kind
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::JoinedCall => "joined-call",
            EventKind::LeftCall => "left-call",
            EventKind::CallEnded => "call-ended",
            EventKind::AudioMuted => "audio-muted",
            EventKind::VideoMuted => "video-muted",
            EventKind::CallIncoming => "call.incoming",
            EventKind::CallAnswered => "call.answered",
            EventKind::QueueUpdated => "queue.updated",
            EventKind::CallQueued => "call.queued",
            EventKind::CallAssigned => "call.assigned",
            EventKind::AgentStatusChanged => "agent.status_changed",
            EventKind::Error => "error",
        }
    }

    /// Look up a kind by wire name
    pub fn from_name(name: &str) -> Option<Self> {
        EventKind::ALL.iter().copied().find(|k| k.name() == name)
    }
}

/// A decoded authoritative server event
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Call session created or updated; status says ringing vs active
    JoinedCall {
        seq: u64,
        session: CallSessionPayload,
    },
    /// Local client detached from the call
    LeftCall { seq: u64, call_id: CallId },
    /// Call terminated; always wins over local optimistic state
    CallEnded {
        seq: u64,
        call_id: CallId,
        duration: Option<u64>,
    },
    /// Audio mute confirmation for some user on the call
    AudioMuted { seq: u64, state: MuteStatePayload },
    /// Video mute confirmation for some user on the call
    VideoMuted { seq: u64, state: MuteStatePayload },
    /// Inbound ring notification
    CallIncoming {
        seq: u64,
        info: IncomingCallPayload,
    },
    /// Another agent answered a call
    CallAnswered {
        seq: u64,
        call_id: CallId,
        agent_email: Option<String>,
    },
    /// Queue snapshot; shape is backend-defined, carried raw
    QueueUpdated {
        seq: u64,
        snapshot: serde_json::Value,
    },
    /// A call entered the waiting queue
    CallQueued {
        seq: u64,
        call_id: CallId,
        queue_position: u32,
    },
    /// A queued call was assigned to an agent
    CallAssigned {
        seq: u64,
        call_id: CallId,
        agent_id: Option<String>,
    },
    /// Another agent's availability changed
    AgentStatusChanged {
        seq: u64,
        agent_id: String,
        status: AgentStatus,
    },
    /// Server-reported error; surfaced to the user, never mutates call state
    Error { seq: u64, message: String },
}

impl ServerEvent {
    /// Decode a server frame into a typed event
    pub fn from_frame(frame: &Frame) -> Result<Self, WireError> {
        let kind = EventKind::from_name(&frame.event).ok_or_else(|| WireError::UnknownEvent {
            name: frame.event.clone(),
        })?;
        let seq = frame.seq.ok_or_else(|| WireError::MissingSequence {
            event: frame.event.clone(),
        })?;

        let event = match kind {
            EventKind::JoinedCall => ServerEvent::JoinedCall {
                seq,
                session: decode(kind, &frame.payload)?,
            },
            EventKind::LeftCall => {
                let p: CallRefPayload = decode(kind, &frame.payload)?;
                ServerEvent::LeftCall {
                    seq,
                    call_id: p.call_id,
                }
            }
            EventKind::CallEnded => {
                let p: CallEndedPayload = decode(kind, &frame.payload)?;
                ServerEvent::CallEnded {
                    seq,
                    call_id: p.call_id,
                    duration: p.duration,
                }
            }
            EventKind::AudioMuted => ServerEvent::AudioMuted {
                seq,
                state: decode(kind, &frame.payload)?,
            },
            EventKind::VideoMuted => ServerEvent::VideoMuted {
                seq,
                state: decode(kind, &frame.payload)?,
            },
            EventKind::CallIncoming => ServerEvent::CallIncoming {
                seq,
                info: decode(kind, &frame.payload)?,
            },
            EventKind::CallAnswered => {
                let p: CallAnsweredPayload = decode(kind, &frame.payload)?;
                ServerEvent::CallAnswered {
                    seq,
                    call_id: p.call_id,
                    agent_email: p.agent_email,
                }
            }
            EventKind::QueueUpdated => ServerEvent::QueueUpdated {
                seq,
                snapshot: frame.payload.clone(),
            },
            EventKind::CallQueued => {
                let p: CallQueuedPayload = decode(kind, &frame.payload)?;
                ServerEvent::CallQueued {
                    seq,
                    call_id: p.call_id,
                    queue_position: p.queue_position,
                }
            }
            EventKind::CallAssigned => {
                let p: CallAssignedPayload = decode(kind, &frame.payload)?;
                ServerEvent::CallAssigned {
                    seq,
                    call_id: p.call_id,
                    agent_id: p.agent_id,
                }
            }
            EventKind::AgentStatusChanged => {
                let p: AgentStatusChangedPayload = decode(kind, &frame.payload)?;
                ServerEvent::AgentStatusChanged {
                    seq,
                    agent_id: p.agent_id,
                    status: p.status,
                }
            }
            EventKind::Error => {
                let p: ErrorPayload = decode(kind, &frame.payload)?;
                ServerEvent::Error {
                    seq,
                    message: p.message,
                }
            }
        };

        Ok(event)
    }

    /// Routing kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::JoinedCall { .. } => EventKind::JoinedCall,
            ServerEvent::LeftCall { .. } => EventKind::LeftCall,
            ServerEvent::CallEnded { .. } => EventKind::CallEnded,
            ServerEvent::AudioMuted { .. } => EventKind::AudioMuted,
            ServerEvent::VideoMuted { .. } => EventKind::VideoMuted,
            ServerEvent::CallIncoming { .. } => EventKind::CallIncoming,
            ServerEvent::CallAnswered { .. } => EventKind::CallAnswered,
            ServerEvent::QueueUpdated { .. } => EventKind::QueueUpdated,
            ServerEvent::CallQueued { .. } => EventKind::CallQueued,
            ServerEvent::CallAssigned { .. } => EventKind::CallAssigned,
            ServerEvent::AgentStatusChanged { .. } => EventKind::AgentStatusChanged,
            ServerEvent::Error { .. } => EventKind::Error,
        }
    }

    /// Server sequence number of this event
    pub fn seq(&self) -> u64 {
        match self {
            ServerEvent::JoinedCall { seq, .. }
            | ServerEvent::LeftCall { seq, .. }
            | ServerEvent::CallEnded { seq, .. }
            | ServerEvent::AudioMuted { seq, .. }
            | ServerEvent::VideoMuted { seq, .. }
            | ServerEvent::CallIncoming { seq, .. }
            | ServerEvent::CallAnswered { seq, .. }
            | ServerEvent::QueueUpdated { seq, .. }
            | ServerEvent::CallQueued { seq, .. }
            | ServerEvent::CallAssigned { seq, .. }
            | ServerEvent::AgentStatusChanged { seq, .. }
            | ServerEvent::Error { seq, .. } => *seq,
        }
    }

    /// Call this event refers to, if any
    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            ServerEvent::JoinedCall { session, .. } => Some(&session.call_id),
            ServerEvent::LeftCall { call_id, .. }
            | ServerEvent::CallEnded { call_id, .. }
            | ServerEvent::CallAnswered { call_id, .. }
            | ServerEvent::CallQueued { call_id, .. }
            | ServerEvent::CallAssigned { call_id, .. } => Some(call_id),
            ServerEvent::AudioMuted { state, .. } | ServerEvent::VideoMuted { state, .. } => {
                Some(&state.call_id)
            }
            ServerEvent::CallIncoming { info, .. } => Some(&info.call_id),
            _ => None,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    kind: EventKind,
    payload: &serde_json::Value,
) -> Result<T, WireError> {
    serde_json::from_value(payload.clone()).map_err(|e| WireError::MalformedPayload {
        event: kind.name().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, seq: u64, payload: serde_json::Value) -> Frame {
        Frame {
            event: event.to_string(),
            seq: Some(seq),
            payload,
        }
    }

    #[test]
    fn joined_call_decodes_session_object() {
        let f = frame(
            "joined-call",
            3,
            serde_json::json!({
                "callId": "c1",
                "direction": "outbound",
                "counterpartNumber": "+15550100",
                "status": "active"
            }),
        );
        match ServerEvent::from_frame(&f).expect("decode") {
            ServerEvent::JoinedCall { seq, session } => {
                assert_eq!(seq, 3);
                assert_eq!(session.call_id.as_str(), "c1");
                assert_eq!(session.status, CallStatus::Active);
                assert_eq!(session.direction, Some(CallDirection::Outbound));
                assert!(!session.audio_muted);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn audio_muted_decodes_user_and_state() {
        let f = frame(
            "audio-muted",
            9,
            serde_json::json!({"userId": "u1", "callId": "c1", "muted": true}),
        );
        match ServerEvent::from_frame(&f).expect("decode") {
            ServerEvent::AudioMuted { state, .. } => {
                assert_eq!(state.user_id, "u1");
                assert!(state.muted);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_is_tolerable_error() {
        let f = frame("call.transcribed", 4, serde_json::json!({}));
        let err = ServerEvent::from_frame(&f).expect_err("should not decode");
        assert!(err.is_unknown_event());
    }

    #[test]
    fn missing_seq_is_rejected() {
        let f = Frame {
            event: "left-call".to_string(),
            seq: None,
            payload: serde_json::json!({"callId": "c1"}),
        };
        let err = ServerEvent::from_frame(&f).expect_err("should fail");
        assert!(matches!(err, WireError::MissingSequence { .. }));
    }

    #[test]
    fn incoming_call_tolerates_missing_caller_info() {
        let f = frame("call.incoming", 1, serde_json::json!({"callId": "c7"}));
        match ServerEvent::from_frame(&f).expect("decode") {
            ServerEvent::CallIncoming { info, .. } => {
                assert_eq!(info.call_id.as_str(), "c7");
                assert!(info.caller_info.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
