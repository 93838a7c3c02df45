//! Event handling for client-core operations
//!
//! This module provides the event system the call-control surface consumes:
//! incoming-call notifications, call state changes, mute confirmations and
//! reverts, queue monitor updates, connection transitions, and errors. The
//! event system supports filtering, prioritization, and async handling.
//!
//! Events are delivered two ways, and both may be used at once:
//!
//! - a broadcast channel obtained from
//!   [`CallClient::subscribe_events`](crate::CallClient::subscribe_events);
//! - an [`ClientEventHandler`] registered on the client, invoked per event.

use std::collections::HashSet;
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::call::{CallId, CallState, MutationField};
use crate::connection::ConnectionState;
use calldesk_signal_core::AgentStatus;

/// Action to take for an incoming call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallAction {
    /// Accept the incoming call (sends `answer-call`)
    Accept,
    /// Decline the incoming call (sends `end-call`)
    Reject,
    /// Ignore the incoming call (leave it ringing)
    Ignore,
}

/// Information about an incoming call
#[derive(Debug, Clone)]
pub struct IncomingCallInfo {
    /// Unique call identifier
    pub call_id: CallId,
    /// Number of the caller (if available)
    pub caller_number: Option<String>,
    /// Display name of the caller (if available)
    pub caller_name: Option<String>,
    /// When the ring was received
    pub created_at: DateTime<Utc>,
}

/// Information about a call state change
#[derive(Debug, Clone)]
pub struct CallStatusInfo {
    /// Call that changed state; `None` while an outbound call has no id yet
    pub call_id: Option<CallId>,
    /// New call state
    pub new_state: CallState,
    /// Previous call state (if known)
    pub previous_state: Option<CallState>,
    /// Reason for the state change (if available)
    pub reason: Option<String>,
    /// When the state change occurred
    pub timestamp: DateTime<Utc>,
}

/// Information about a mute flag change
#[derive(Debug, Clone)]
pub struct MuteStatusInfo {
    /// Call the change applies to
    pub call_id: CallId,
    /// Which flag changed
    pub field: MutationField,
    /// New value of the flag
    pub muted: bool,
    /// Whether the value is server-confirmed (false = optimistic)
    pub confirmed: bool,
    /// When the change occurred
    pub timestamp: DateTime<Utc>,
}

/// Information about an optimistic mutation that did not take effect
#[derive(Debug, Clone)]
pub struct MutationRevertInfo {
    /// Call the mutation addressed
    pub call_id: CallId,
    /// Which flag was reverted
    pub field: MutationField,
    /// The value the flag was reverted to
    pub reverted_to: bool,
    /// When the revert occurred
    pub timestamp: DateTime<Utc>,
}

/// Queue monitor updates pushed by the routing backend
#[derive(Debug, Clone)]
pub enum QueueEventKind {
    /// Queue snapshot; shape is backend-defined
    Updated { snapshot: serde_json::Value },
    /// A call entered the waiting queue
    CallQueued { call_id: CallId, position: u32 },
    /// A queued call was assigned to an agent
    CallAssigned {
        call_id: CallId,
        agent_id: Option<String>,
    },
    /// A call was answered by an agent
    CallAnswered {
        call_id: CallId,
        agent_email: Option<String>,
    },
    /// Another agent's availability changed
    AgentStatusChanged {
        agent_id: String,
        status: AgentStatus,
    },
}

/// Queue monitor event information
#[derive(Debug, Clone)]
pub struct QueueEventInfo {
    /// What happened
    pub kind: QueueEventKind,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

/// Event priority levels for filtering
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// Low priority events (queue snapshots, routine status)
    Low,
    /// Normal priority events (state changes, mute confirmations)
    Normal,
    /// High priority events (incoming calls, reverts)
    High,
    /// Critical priority events (auth failures, retry exhaustion)
    Critical,
}

/// Event filtering options for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only receive events for specific calls
    pub call_ids: Option<HashSet<CallId>>,
    /// Only receive specific types of call state changes
    pub call_states: Option<HashSet<CallState>>,
    /// Minimum event priority level
    pub min_priority: Option<EventPriority>,
}

/// Comprehensive client event types
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Incoming call ringing
    IncomingCall {
        info: IncomingCallInfo,
        priority: EventPriority,
    },
    /// Call state changed
    CallStateChanged {
        info: CallStatusInfo,
        priority: EventPriority,
    },
    /// Mute flag changed (optimistically or confirmed)
    MuteStateChanged {
        info: MuteStatusInfo,
        priority: EventPriority,
    },
    /// An optimistic mutation timed out and was reverted
    MutationReverted {
        info: MutationRevertInfo,
        priority: EventPriority,
    },
    /// Queue monitor update
    QueueEvent {
        info: QueueEventInfo,
        priority: EventPriority,
    },
    /// Client error occurred
    ClientError {
        error: crate::ClientError,
        call_id: Option<CallId>,
        priority: EventPriority,
    },
    /// Connection state changed
    ConnectionStateChanged {
        state: ConnectionState,
        reason: Option<String>,
        priority: EventPriority,
    },
}

impl ClientEvent {
    /// Get the priority of this event
    pub fn priority(&self) -> EventPriority {
        match self {
            ClientEvent::IncomingCall { priority, .. } => priority.clone(),
            ClientEvent::CallStateChanged { priority, .. } => priority.clone(),
            ClientEvent::MuteStateChanged { priority, .. } => priority.clone(),
            ClientEvent::MutationReverted { priority, .. } => priority.clone(),
            ClientEvent::QueueEvent { priority, .. } => priority.clone(),
            ClientEvent::ClientError { priority, .. } => priority.clone(),
            ClientEvent::ConnectionStateChanged { priority, .. } => priority.clone(),
        }
    }

    /// Get the call ID associated with this event (if any)
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            ClientEvent::IncomingCall { info, .. } => Some(info.call_id.clone()),
            ClientEvent::CallStateChanged { info, .. } => info.call_id.clone(),
            ClientEvent::MuteStateChanged { info, .. } => Some(info.call_id.clone()),
            ClientEvent::MutationReverted { info, .. } => Some(info.call_id.clone()),
            ClientEvent::ClientError { call_id, .. } => call_id.clone(),
            _ => None,
        }
    }

    /// Check if this event passes the given filter
    pub fn passes_filter(&self, filter: &EventFilter) -> bool {
        // Check priority filter
        if let Some(min_priority) = &filter.min_priority {
            if self.priority() < *min_priority {
                return false;
            }
        }

        // Check call ID filter
        if let Some(call_ids) = &filter.call_ids {
            match self.call_id() {
                Some(call_id) if call_ids.contains(&call_id) => {}
                _ => return false,
            }
        }

        // Check call state filter
        if let Some(call_states) = &filter.call_states {
            if let ClientEvent::CallStateChanged { info, .. } = self {
                if !call_states.contains(&info.new_state) {
                    return false;
                }
            }
        }

        true
    }
}

/// Handler for client events with per-type callbacks
///
/// Only `on_incoming_call` and `on_call_state_changed` are required; the
/// rest default to no-ops so handlers implement exactly what they care
/// about.
#[async_trait]
pub trait ClientEventHandler: Send + Sync {
    /// Handle an incoming call with an action decision
    async fn on_incoming_call(&self, call_info: IncomingCallInfo) -> CallAction;

    /// Handle call state changes
    async fn on_call_state_changed(&self, status_info: CallStatusInfo);

    /// Handle mute flag changes (optional)
    async fn on_mute_state_changed(&self, _mute_info: MuteStatusInfo) {}

    /// Handle optimistic mutation reverts (optional)
    async fn on_mutation_reverted(&self, _revert_info: MutationRevertInfo) {}

    /// Handle queue monitor updates (optional)
    async fn on_queue_event(&self, _queue_info: QueueEventInfo) {}

    /// Handle client errors (optional)
    async fn on_client_error(&self, _error: crate::ClientError, _call_id: Option<CallId>) {}

    /// Handle connection state changes (optional)
    async fn on_connection_state_changed(
        &self,
        _state: ConnectionState,
        _reason: Option<String>,
    ) {
    }

    /// Handle comprehensive client events with dispatch to the typed
    /// callbacks above
    async fn on_client_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::IncomingCall { info, .. } => {
                self.on_incoming_call(info).await;
            }
            ClientEvent::CallStateChanged { info, .. } => {
                self.on_call_state_changed(info).await;
            }
            ClientEvent::MuteStateChanged { info, .. } => {
                self.on_mute_state_changed(info).await;
            }
            ClientEvent::MutationReverted { info, .. } => {
                self.on_mutation_reverted(info).await;
            }
            ClientEvent::QueueEvent { info, .. } => {
                self.on_queue_event(info).await;
            }
            ClientEvent::ClientError {
                error, call_id, ..
            } => {
                self.on_client_error(error, call_id).await;
            }
            ClientEvent::ConnectionStateChanged { state, reason, .. } => {
                self.on_connection_state_changed(state, reason).await;
            }
        }
    }
}

/// Event subscription with filtering and an explicit unsubscribe token
pub struct EventSubscription {
    handler: Arc<dyn ClientEventHandler>,
    filter: EventFilter,
    id: uuid::Uuid,
}

impl EventSubscription {
    /// Create a new event subscription with filtering
    pub fn new(handler: Arc<dyn ClientEventHandler>, filter: EventFilter) -> Self {
        Self {
            handler,
            filter,
            id: uuid::Uuid::new_v4(),
        }
    }

    /// Create a subscription that receives all events
    pub fn all_events(handler: Arc<dyn ClientEventHandler>) -> Self {
        Self::new(handler, EventFilter::default())
    }

    /// Create a subscription for a specific call only
    pub fn call_events(handler: Arc<dyn ClientEventHandler>, call_id: CallId) -> Self {
        let mut call_ids = HashSet::new();
        call_ids.insert(call_id);
        let filter = EventFilter {
            call_ids: Some(call_ids),
            ..Default::default()
        };
        Self::new(handler, filter)
    }

    /// Create a subscription for high priority events only
    pub fn high_priority_events(handler: Arc<dyn ClientEventHandler>) -> Self {
        let filter = EventFilter {
            min_priority: Some(EventPriority::High),
            ..Default::default()
        };
        Self::new(handler, filter)
    }

    /// Get the subscription ID (the unsubscribe token)
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Check if this subscription should receive the given event
    pub fn should_receive(&self, event: &ClientEvent) -> bool {
        event.passes_filter(&self.filter)
    }

    /// Deliver an event to this subscription's handler
    pub async fn deliver_event(&self, event: ClientEvent) {
        if self.should_receive(&event) {
            self.handler.on_client_event(event).await;
        }
    }
}

impl Clone for EventSubscription {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            filter: self.filter.clone(),
            id: self.id,
        }
    }
}

/// Event emission utilities for filtered subscriptions
pub struct EventEmitter {
    subscriptions: std::sync::RwLock<Vec<EventSubscription>>,
}

impl EventEmitter {
    /// Create a new event emitter
    pub fn new() -> Self {
        Self {
            subscriptions: std::sync::RwLock::new(Vec::new()),
        }
    }

    /// Add an event subscription, returning its unsubscribe token
    pub fn subscribe(&self, subscription: EventSubscription) -> uuid::Uuid {
        let id = subscription.id();
        self.subscriptions
            .write()
            .expect("subscriptions lock poisoned")
            .push(subscription);
        id
    }

    /// Remove an event subscription by token
    pub fn unsubscribe(&self, subscription_id: uuid::Uuid) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .expect("subscriptions lock poisoned");
        if let Some(pos) = subscriptions.iter().position(|s| s.id() == subscription_id) {
            subscriptions.remove(pos);
            true
        } else {
            false
        }
    }

    /// Emit an event to all matching subscriptions
    pub async fn emit(&self, event: ClientEvent) {
        let subscriptions = self
            .subscriptions
            .read()
            .expect("subscriptions lock poisoned")
            .clone();

        for subscription in subscriptions {
            subscription.deliver_event(event.clone()).await;
        }
    }

    /// Get the number of active subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .expect("subscriptions lock poisoned")
            .len()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_event(state: CallState, priority: EventPriority) -> ClientEvent {
        ClientEvent::CallStateChanged {
            info: CallStatusInfo {
                call_id: Some(CallId::from("c1")),
                new_state: state,
                previous_state: None,
                reason: None,
                timestamp: Utc::now(),
            },
            priority,
        }
    }

    #[test]
    fn priority_filter_drops_low_events() {
        let filter = EventFilter {
            min_priority: Some(EventPriority::High),
            ..Default::default()
        };
        assert!(!state_event(CallState::Active, EventPriority::Normal).passes_filter(&filter));
        assert!(state_event(CallState::Active, EventPriority::Critical).passes_filter(&filter));
    }

    #[test]
    fn call_id_filter_requires_match() {
        let mut call_ids = HashSet::new();
        call_ids.insert(CallId::from("c2"));
        let filter = EventFilter {
            call_ids: Some(call_ids),
            ..Default::default()
        };
        assert!(!state_event(CallState::Active, EventPriority::Normal).passes_filter(&filter));
    }

    #[test]
    fn unsubscribe_removes_subscription() {
        struct NoopHandler;
        #[async_trait]
        impl ClientEventHandler for NoopHandler {
            async fn on_incoming_call(&self, _info: IncomingCallInfo) -> CallAction {
                CallAction::Ignore
            }
            async fn on_call_state_changed(&self, _info: CallStatusInfo) {}
        }

        let emitter = EventEmitter::new();
        let id = emitter.subscribe(EventSubscription::all_events(Arc::new(NoopHandler)));
        assert_eq!(emitter.subscription_count(), 1);
        assert!(emitter.unsubscribe(id));
        assert_eq!(emitter.subscription_count(), 0);
        assert!(!emitter.unsubscribe(id));
    }
}
