//! Frame envelope for the signaling channel
//!
//! Every message on the duplex channel is a single JSON text frame:
//!
//! ```text
//! {"event": "<name>", "seq": <u64>, "payload": {...}}
//! ```
//!
//! Server frames always carry `seq`, a per-connection monotonically
//! increasing sequence number. Channel delivery order is not guaranteed
//! across event types, so consumers resolve conflicts by comparing `seq`,
//! never arrival order. Client frames omit `seq`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque call identifier assigned by the backend, unique per call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub String);

impl CallId {
    /// View the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CallId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single message on the signaling channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Event name (e.g. "joined-call", "mute-audio")
    pub event: String,
    /// Server sequence number; absent on client frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Event payload; `null` when the event carries none
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Frame {
    /// Decode a frame from a text message
    pub fn decode(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(|e| WireError::MalformedFrame {
            reason: e.to_string(),
        })
    }

    /// Encode this frame into a text message
    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(|e| WireError::Encode {
            reason: e.to_string(),
        })
    }
}

/// Result type alias for wire operations
pub type WireResult<T> = Result<T, WireError>;

/// Errors produced while encoding or decoding channel messages
#[derive(Error, Debug, Clone)]
pub enum WireError {
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("unknown event: {name}")]
    UnknownEvent { name: String },

    #[error("malformed payload for {event}: {reason}")]
    MalformedPayload { event: String, reason: String },

    #[error("missing sequence number on server event {event}")]
    MissingSequence { event: String },

    #[error("failed to encode frame: {reason}")]
    Encode { reason: String },
}

impl WireError {
    /// Unknown events are tolerated (logged and skipped) by consumers;
    /// everything else indicates a malformed peer.
    pub fn is_unknown_event(&self) -> bool {
        matches!(self, WireError::UnknownEvent { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_server_frame_with_seq() {
        let frame = Frame::decode(r#"{"event":"left-call","seq":7,"payload":{"callId":"c1"}}"#)
            .expect("valid frame");
        assert_eq!(frame.event, "left-call");
        assert_eq!(frame.seq, Some(7));
        assert_eq!(frame.payload["callId"], "c1");
    }

    #[test]
    fn decode_frame_without_payload() {
        let frame = Frame::decode(r#"{"event":"join-queue-monitor"}"#).expect("valid frame");
        assert_eq!(frame.event, "join-queue-monitor");
        assert!(frame.seq.is_none());
        assert!(frame.payload.is_null());
    }

    #[test]
    fn encode_client_frame_omits_seq() {
        let frame = Frame {
            event: "end-call".to_string(),
            seq: None,
            payload: serde_json::json!({"callId": "c9"}),
        };
        let text = frame.encode().expect("encode");
        assert!(!text.contains("seq"));
        assert!(text.contains("\"callId\":\"c9\""));
    }

    #[test]
    fn decode_malformed_frame_is_typed_error() {
        let err = Frame::decode("{not json").expect_err("should fail");
        assert!(matches!(err, WireError::MalformedFrame { .. }));
    }
}
