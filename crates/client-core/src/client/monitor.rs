// Queue/agent monitor operations for the client-core library
//
// Thin passthroughs over the monitor vocabulary of the signaling channel.
// The client keeps no queue state; snapshots and routing outcomes arrive as
// QueueEvent client events.

use std::collections::HashMap;

use tracing::info;

use crate::call::CallId;
use crate::error::{ClientError, ClientResult};
use calldesk_signal_core::{
    AgentStatus, AgentStatusPayload, CallPriorityPayload, CallTargetPayload, ClientCommand,
    RouteCallPayload,
};

/// Queue monitor operations implementation for CallClient
impl super::manager::CallClient {
    /// Attach as an observer to a call's event stream
    ///
    /// Supervisors use this to follow calls they are not a party of; the
    /// observed call's events arrive like any other inbound events.
    pub async fn observe_call(&self, call_id: CallId) -> ClientResult<()> {
        self.connection
            .send(&ClientCommand::JoinCall(CallTargetPayload { call_id }))
    }

    /// Detach from an observed call's event stream
    pub async fn unobserve_call(&self, call_id: CallId) -> ClientResult<()> {
        self.connection
            .send(&ClientCommand::LeaveCall(CallTargetPayload { call_id }))
    }

    /// Start receiving queue snapshots
    pub async fn join_queue_monitor(&self) -> ClientResult<()> {
        self.connection.send(&ClientCommand::JoinQueueMonitor)
    }

    /// Stop receiving queue snapshots
    pub async fn leave_queue_monitor(&self) -> ClientResult<()> {
        self.connection.send(&ClientCommand::LeaveQueueMonitor)
    }

    /// Report this operator's availability to the routing backend
    pub async fn update_agent_status(
        &self,
        status: AgentStatus,
        current_call_id: Option<CallId>,
    ) -> ClientResult<()> {
        info!(status = %status, "updating agent status");
        self.connection
            .send(&ClientCommand::UpdateAgentStatus(AgentStatusPayload {
                status,
                current_call_id,
            }))
    }

    /// Ask the router to (re)route a queued call
    pub async fn route_call(
        &self,
        call_id: CallId,
        priority: u32,
        metadata: HashMap<String, String>,
    ) -> ClientResult<()> {
        if priority == 0 {
            return Err(ClientError::InvalidConfiguration {
                field: "priority".to_string(),
                reason: "priority must be at least 1".to_string(),
            });
        }
        self.connection
            .send(&ClientCommand::RouteCall(RouteCallPayload {
                call_id,
                priority,
                metadata,
            }))
    }

    /// Change a queued call's priority
    pub async fn update_call_priority(&self, call_id: CallId, priority: u32) -> ClientResult<()> {
        self.connection
            .send(&ClientCommand::UpdateCallPriority(CallPriorityPayload {
                call_id,
                priority,
            }))
    }
}
