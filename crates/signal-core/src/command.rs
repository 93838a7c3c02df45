//! Outbound commands sent by the client over the signaling channel
//!
//! Commands are fire-and-forget: the channel carries no acknowledgement
//! envelope, so the effect of a command is only observable through the
//! authoritative events the server pushes back. Field names on the wire are
//! camelCase, matching the backend service.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::frame::{CallId, Frame, WireError};

/// Payload for `initiate-call`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCallPayload {
    /// Number to dial
    pub callee_number: String,
    /// Free-form call metadata forwarded to the backend
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Payload for commands that address a call by id
/// (`answer-call`, `end-call`, `join-call`, `leave-call`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTargetPayload {
    pub call_id: CallId,
}

/// Payload for `mute-audio` / `mute-video`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutePayload {
    pub call_id: CallId,
    /// Desired mute state (true = muted)
    pub muted: bool,
}

/// Operator availability states understood by the routing backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Available,
    Busy,
    Away,
    Offline,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Available => "available",
            AgentStatus::Busy => "busy",
            AgentStatus::Away => "away",
            AgentStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Payload for `update-agent-status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusPayload {
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_call_id: Option<CallId>,
}

/// Payload for `route-call`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteCallPayload {
    pub call_id: CallId,
    pub priority: u32,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Payload for `update-call-priority`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPriorityPayload {
    pub call_id: CallId,
    pub priority: u32,
}

/// Every command the client can emit on the channel
#[derive(Debug, Clone)]
pub enum ClientCommand {
    /// Request a new outbound call
    InitiateCall(InitiateCallPayload),
    /// Accept a ringing inbound call
    AnswerCall(CallTargetPayload),
    /// Terminate the active call
    EndCall(CallTargetPayload),
    /// Set local audio mute intent
    MuteAudio(MutePayload),
    /// Set local video mute intent
    MuteVideo(MutePayload),
    /// Attach as an observer to a call's event stream
    JoinCall(CallTargetPayload),
    /// Detach from a call's event stream
    LeaveCall(CallTargetPayload),
    /// Start receiving queue snapshots
    JoinQueueMonitor,
    /// Stop receiving queue snapshots
    LeaveQueueMonitor,
    /// Report operator availability to the router
    UpdateAgentStatus(AgentStatusPayload),
    /// Ask the router to (re)route a queued call
    RouteCall(RouteCallPayload),
    /// Change a queued call's priority
    UpdateCallPriority(CallPriorityPayload),
}

impl ClientCommand {
    /// Wire event name for this command
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientCommand::InitiateCall(_) => "initiate-call",
            ClientCommand::AnswerCall(_) => "answer-call",
            ClientCommand::EndCall(_) => "end-call",
            ClientCommand::MuteAudio(_) => "mute-audio",
            ClientCommand::MuteVideo(_) => "mute-video",
            ClientCommand::JoinCall(_) => "join-call",
            ClientCommand::LeaveCall(_) => "leave-call",
            ClientCommand::JoinQueueMonitor => "join-queue-monitor",
            ClientCommand::LeaveQueueMonitor => "leave-queue-monitor",
            ClientCommand::UpdateAgentStatus(_) => "update-agent-status",
            ClientCommand::RouteCall(_) => "route-call",
            ClientCommand::UpdateCallPriority(_) => "update-call-priority",
        }
    }

    /// Build the wire frame for this command
    pub fn to_frame(&self) -> Result<Frame, WireError> {
        let payload = match self {
            ClientCommand::InitiateCall(p) => to_payload(self.event_name(), p)?,
            ClientCommand::AnswerCall(p)
            | ClientCommand::EndCall(p)
            | ClientCommand::JoinCall(p)
            | ClientCommand::LeaveCall(p) => to_payload(self.event_name(), p)?,
            ClientCommand::MuteAudio(p) | ClientCommand::MuteVideo(p) => {
                to_payload(self.event_name(), p)?
            }
            ClientCommand::JoinQueueMonitor | ClientCommand::LeaveQueueMonitor => {
                serde_json::Value::Object(serde_json::Map::new())
            }
            ClientCommand::UpdateAgentStatus(p) => to_payload(self.event_name(), p)?,
            ClientCommand::RouteCall(p) => to_payload(self.event_name(), p)?,
            ClientCommand::UpdateCallPriority(p) => to_payload(self.event_name(), p)?,
        };

        Ok(Frame {
            event: self.event_name().to_string(),
            seq: None,
            payload,
        })
    }

    /// Call this command addresses, if any
    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            ClientCommand::AnswerCall(p)
            | ClientCommand::EndCall(p)
            | ClientCommand::JoinCall(p)
            | ClientCommand::LeaveCall(p) => Some(&p.call_id),
            ClientCommand::MuteAudio(p) | ClientCommand::MuteVideo(p) => Some(&p.call_id),
            ClientCommand::RouteCall(p) => Some(&p.call_id),
            ClientCommand::UpdateCallPriority(p) => Some(&p.call_id),
            ClientCommand::UpdateAgentStatus(p) => p.current_call_id.as_ref(),
            _ => None,
        }
    }
}

fn to_payload<T: Serialize>(event: &str, value: &T) -> Result<serde_json::Value, WireError> {
    serde_json::to_value(value).map_err(|e| WireError::MalformedPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiate_call_uses_camel_case_fields() {
        let cmd = ClientCommand::InitiateCall(InitiateCallPayload {
            callee_number: "+15550100".to_string(),
            metadata: HashMap::new(),
        });
        let frame = cmd.to_frame().expect("frame");
        assert_eq!(frame.event, "initiate-call");
        assert_eq!(frame.payload["calleeNumber"], "+15550100");
        // Empty metadata is omitted entirely
        assert!(frame.payload.get("metadata").is_none());
    }

    #[test]
    fn mute_audio_carries_call_id_and_state() {
        let cmd = ClientCommand::MuteAudio(MutePayload {
            call_id: CallId::from("c1"),
            muted: true,
        });
        let frame = cmd.to_frame().expect("frame");
        assert_eq!(frame.event, "mute-audio");
        assert_eq!(frame.payload["callId"], "c1");
        assert_eq!(frame.payload["muted"], true);
        assert!(frame.seq.is_none());
    }

    #[test]
    fn monitor_commands_have_empty_payload() {
        let frame = ClientCommand::JoinQueueMonitor.to_frame().expect("frame");
        assert_eq!(frame.event, "join-queue-monitor");
        assert_eq!(frame.payload, serde_json::json!({}));
    }

    #[test]
    fn agent_status_serializes_lowercase() {
        let cmd = ClientCommand::UpdateAgentStatus(AgentStatusPayload {
            status: AgentStatus::Available,
            current_call_id: None,
        });
        let frame = cmd.to_frame().expect("frame");
        assert_eq!(frame.payload["status"], "available");
        assert!(frame.payload.get("currentCallId").is_none());
    }
}
