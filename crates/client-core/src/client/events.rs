//! Event handling for the client-core library
//!
//! This module contains the handler that bridges authoritative server
//! events to client events and call-session transitions. It is the only
//! place inbound events mutate the session, which keeps the ordering and
//! reconciliation rules in one spot.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::call::{CallSession, CallState, MutationField};
use crate::connection::ConnectionManager;
use crate::error::ClientError;
use crate::events::{
    CallAction, CallStatusInfo, ClientEvent, ClientEventHandler, EventPriority, IncomingCallInfo,
    MutationRevertInfo, MuteStatusInfo, QueueEventInfo, QueueEventKind,
};
use calldesk_signal_core::{
    CallId, CallStatus, CallTargetPayload, ClientCommand, MuteStatePayload, ServerEvent,
};

use super::reconciler::{ConfirmOutcome, Reconciler};
use super::types::ClientStats;

/// Internal handler that bridges wire events to client events
///
/// Owned by the [`CallClient`](crate::CallClient); the dispatch task feeds
/// it every decoded inbound event.
pub struct ClientSignalHandler {
    pub(crate) session: Arc<RwLock<Option<CallSession>>>,
    pub(crate) reconciler: Arc<Reconciler>,
    pub(crate) connection: Arc<ConnectionManager>,
    pub(crate) event_tx: broadcast::Sender<ClientEvent>,
    pub(crate) client_event_handler: Arc<RwLock<Option<Arc<dyn ClientEventHandler>>>>,
    pub(crate) local_user_id: Arc<RwLock<Option<String>>>,
    pub(crate) stats: Arc<Mutex<ClientStats>>,
}

impl std::fmt::Debug for ClientSignalHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSignalHandler")
            .field("client_event_handler", &"<event handler>")
            .finish_non_exhaustive()
    }
}

impl ClientSignalHandler {
    pub(crate) async fn set_event_handler(&self, handler: Arc<dyn ClientEventHandler>) {
        *self.client_event_handler.write().await = Some(handler);
    }

    /// Broadcast an event and forward it to the registered handler
    pub(crate) async fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event.clone());
        if let Some(handler) = self.client_event_handler.read().await.as_ref() {
            handler.on_client_event(event).await;
        }
    }

    /// Process one authoritative server event
    pub(crate) async fn handle_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::JoinedCall { session, .. } => {
                self.on_joined_call(session).await;
            }
            ServerEvent::CallIncoming { info, .. } => {
                self.on_call_incoming(info).await;
            }
            ServerEvent::LeftCall { call_id, .. } => {
                self.on_call_over(call_id, None, "left call").await;
            }
            ServerEvent::CallEnded {
                call_id, duration, ..
            } => {
                self.on_call_over(call_id, duration, "call ended").await;
            }
            ServerEvent::AudioMuted { seq, state } => {
                self.on_mute_event(MutationField::AudioMuted, state, seq)
                    .await;
            }
            ServerEvent::VideoMuted { seq, state } => {
                self.on_mute_event(MutationField::VideoMuted, state, seq)
                    .await;
            }
            ServerEvent::Error { message, .. } => {
                // Surfaced to the user; never mutates the call session
                warn!(message = %message, "server reported an error");
                let call_id = self.session.read().await.as_ref().and_then(|s| s.call_id.clone());
                self.emit(ClientEvent::ClientError {
                    error: ClientError::ServerReported { message },
                    call_id,
                    priority: EventPriority::High,
                })
                .await;
            }
            ServerEvent::CallAnswered {
                call_id,
                agent_email,
                ..
            } => {
                self.emit_queue_event(QueueEventKind::CallAnswered {
                    call_id,
                    agent_email,
                })
                .await;
            }
            ServerEvent::QueueUpdated { snapshot, .. } => {
                self.emit_queue_event(QueueEventKind::Updated { snapshot }).await;
            }
            ServerEvent::CallQueued {
                call_id,
                queue_position,
                ..
            } => {
                self.emit_queue_event(QueueEventKind::CallQueued {
                    call_id,
                    position: queue_position,
                })
                .await;
            }
            ServerEvent::CallAssigned {
                call_id, agent_id, ..
            } => {
                self.emit_queue_event(QueueEventKind::CallAssigned { call_id, agent_id })
                    .await;
            }
            ServerEvent::AgentStatusChanged {
                agent_id, status, ..
            } => {
                self.emit_queue_event(QueueEventKind::AgentStatusChanged { agent_id, status })
                    .await;
            }
        }
    }

    /// `joined-call`: the session object is authoritative
    async fn on_joined_call(&self, payload: calldesk_signal_core::CallSessionPayload) {
        let new_state = match payload.status {
            CallStatus::Ringing => CallState::Ringing,
            CallStatus::Active => CallState::Active,
        };

        let mut guard = self.session.write().await;
        let previous_state = if let Some(session) = guard.as_mut() {
            // An id may now be assigned to an outbound dial; a foreign
            // id while a different call is tracked is a no-op
            if session.call_id.is_some() && !session.matches(&payload.call_id) {
                debug!(call_id = %payload.call_id, "joined-call for a different call, ignoring");
                return;
            }
            let previous = session.state;
            session.call_id = Some(payload.call_id.clone());
            if session.counterpart_number.is_none() {
                session.counterpart_number = payload.counterpart_number.clone();
            }
            if let Some(direction) = payload.direction {
                session.direction = direction;
            }
            session.state = new_state;
            if new_state == CallState::Active && session.connected_at.is_none() {
                session.connected_at = Some(Utc::now());
            }
            // Adopt the server's mute snapshot only for fields with no
            // optimistic value still awaiting its own confirmation
            if !self
                .reconciler
                .is_pending(&payload.call_id, MutationField::AudioMuted)
            {
                session.audio_muted = payload.audio_muted;
            }
            if !self
                .reconciler
                .is_pending(&payload.call_id, MutationField::VideoMuted)
            {
                session.video_muted = payload.video_muted;
            }
            Some(previous)
        } else {
            let mut session = CallSession::inbound(
                payload.call_id.clone(),
                payload.counterpart_number.clone(),
            );
            if let Some(direction) = payload.direction {
                session.direction = direction;
            }
            session.state = new_state;
            session.audio_muted = payload.audio_muted;
            session.video_muted = payload.video_muted;
            if new_state == CallState::Active {
                session.connected_at = Some(Utc::now());
            }
            *guard = Some(session);
            None
        };
        drop(guard);

        info!(call_id = %payload.call_id, state = %new_state, "joined call");
        self.emit(ClientEvent::CallStateChanged {
            info: CallStatusInfo {
                call_id: Some(payload.call_id),
                new_state,
                previous_state,
                reason: Some("joined call".to_string()),
                timestamp: Utc::now(),
            },
            priority: EventPriority::High,
        })
        .await;
    }

    /// `call.incoming`: ring notification
    async fn on_call_incoming(&self, info: calldesk_signal_core::IncomingCallPayload) {
        {
            let mut guard = self.session.write().await;
            if guard.is_some() {
                // Single-call invariant; the backend keeps the call queued
                info!(call_id = %info.call_id, "incoming call while busy, ignoring");
                return;
            }
            let caller_number = info
                .caller_info
                .as_ref()
                .and_then(|c| c.caller_number.clone());
            *guard = Some(CallSession::inbound(info.call_id.clone(), caller_number));
        }

        {
            let mut stats = self.stats.lock().await;
            stats.total_calls += 1;
        }

        let incoming_info = IncomingCallInfo {
            call_id: info.call_id.clone(),
            caller_number: info
                .caller_info
                .as_ref()
                .and_then(|c| c.caller_number.clone()),
            caller_name: info.caller_info.as_ref().and_then(|c| c.caller_name.clone()),
            created_at: Utc::now(),
        };

        info!(
            call_id = %info.call_id,
            caller = incoming_info.caller_number.as_deref().unwrap_or("unknown"),
            "incoming call"
        );

        // Broadcast first so passive listeners always see the ring
        let _ = self.event_tx.send(ClientEvent::IncomingCall {
            info: incoming_info.clone(),
            priority: EventPriority::High,
        });

        let action = match self.client_event_handler.read().await.as_ref() {
            Some(handler) => handler.on_incoming_call(incoming_info).await,
            None => CallAction::Ignore,
        };

        match action {
            CallAction::Accept => self.accept_incoming(info.call_id).await,
            CallAction::Reject => self.decline_incoming(info.call_id).await,
            CallAction::Ignore => {}
        }
    }

    /// Accept a ringing call on behalf of the handler
    async fn accept_incoming(&self, call_id: CallId) {
        {
            let mut guard = self.session.write().await;
            match &mut *guard {
                Some(session) if session.matches(&call_id) => {
                    session.state = CallState::Connecting;
                }
                _ => return,
            }
        }

        if let Err(e) = self
            .connection
            .send(&ClientCommand::AnswerCall(CallTargetPayload {
                call_id: call_id.clone(),
            }))
        {
            warn!(error = %e, call_id = %call_id, "failed to send answer-call");
        }

        self.emit(ClientEvent::CallStateChanged {
            info: CallStatusInfo {
                call_id: Some(call_id),
                new_state: CallState::Connecting,
                previous_state: Some(CallState::Ringing),
                reason: Some("answered".to_string()),
                timestamp: Utc::now(),
            },
            priority: EventPriority::Normal,
        })
        .await;
    }

    /// Decline a ringing call on behalf of the handler
    async fn decline_incoming(&self, call_id: CallId) {
        {
            let mut guard = self.session.write().await;
            let is_current = guard
                .as_ref()
                .map(|session| session.matches(&call_id))
                .unwrap_or(false);
            if !is_current {
                return;
            }
            *guard = None;
        }
        self.reconciler.clear_call(&call_id);

        if let Err(e) = self
            .connection
            .send(&ClientCommand::EndCall(CallTargetPayload {
                call_id: call_id.clone(),
            }))
        {
            warn!(error = %e, call_id = %call_id, "failed to send end-call for decline");
        }

        self.emit(ClientEvent::CallStateChanged {
            info: CallStatusInfo {
                call_id: Some(call_id),
                new_state: CallState::Ended,
                previous_state: Some(CallState::Ringing),
                reason: Some("declined".to_string()),
                timestamp: Utc::now(),
            },
            priority: EventPriority::Normal,
        })
        .await;
    }

    /// `left-call` / `call-ended`: authoritative teardown, always wins
    async fn on_call_over(&self, call_id: CallId, duration: Option<u64>, reason: &str) {
        let previous_state = {
            let mut guard = self.session.write().await;
            let previous = guard.as_ref().and_then(|session| {
                if session.matches(&call_id) {
                    Some(session.state)
                } else {
                    None
                }
            });
            match previous {
                Some(previous) => {
                    *guard = None;
                    previous
                }
                None => {
                    debug!(call_id = %call_id, "call-over event for unknown call, ignoring");
                    return;
                }
            }
        };

        // An ended call leaves nothing to confirm
        self.reconciler.clear_all();

        info!(
            call_id = %call_id,
            duration = duration.unwrap_or(0),
            reason = reason,
            "call over"
        );

        self.emit(ClientEvent::CallStateChanged {
            info: CallStatusInfo {
                call_id: Some(call_id),
                new_state: CallState::Ended,
                previous_state: Some(previous_state),
                reason: Some(reason.to_string()),
                timestamp: Utc::now(),
            },
            priority: EventPriority::High,
        })
        .await;
    }

    /// `audio-muted` / `video-muted`: confirms or corrects a mute flag
    async fn on_mute_event(&self, field: MutationField, state: MuteStatePayload, seq: u64) {
        // Only events for the local user reconcile pending mutations
        let is_local = {
            let local = self.local_user_id.read().await;
            local.as_deref() == Some(state.user_id.as_str())
        };
        if !is_local {
            debug!(user_id = %state.user_id, "mute event for another participant, ignoring");
            return;
        }

        let applied = {
            let mut guard = self.session.write().await;
            match &mut *guard {
                Some(session) if session.matches(&state.call_id) => {
                    match self
                        .reconciler
                        .confirm(&state.call_id, field, state.muted, seq)
                    {
                        ConfirmOutcome::Applied(value) => {
                            session.set_mute_flag(field, value);
                            Some(value)
                        }
                        ConfirmOutcome::Unmatched => {
                            // Server-initiated change with nothing pending
                            session.set_mute_flag(field, state.muted);
                            Some(state.muted)
                        }
                        ConfirmOutcome::Stale => {
                            debug!(
                                call_id = %state.call_id,
                                field = %field,
                                seq = seq,
                                "stale mute event, keeping newer optimistic value"
                            );
                            None
                        }
                    }
                }
                _ => {
                    debug!(call_id = %state.call_id, "mute event for unknown call, ignoring");
                    None
                }
            }
        };

        if let Some(muted) = applied {
            self.emit(ClientEvent::MuteStateChanged {
                info: MuteStatusInfo {
                    call_id: state.call_id,
                    field,
                    muted,
                    confirmed: true,
                    timestamp: Utc::now(),
                },
                priority: EventPriority::Normal,
            })
            .await;
        }
    }

    async fn emit_queue_event(&self, kind: QueueEventKind) {
        self.emit(ClientEvent::QueueEvent {
            info: QueueEventInfo {
                kind,
                timestamp: Utc::now(),
            },
            priority: EventPriority::Low,
        })
        .await;
    }

    /// Revert every expired optimistic mutation and notify the surface
    pub(crate) async fn sweep_expired(&self) {
        let reverted = self.reconciler.take_expired(tokio::time::Instant::now());
        if reverted.is_empty() {
            return;
        }

        for revert in reverted {
            {
                let mut guard = self.session.write().await;
                if let Some(session) = guard.as_mut() {
                    if session.matches(&revert.call_id) {
                        session.set_mute_flag(revert.field, revert.prior);
                    }
                }
            }

            warn!(
                call_id = %revert.call_id,
                field = %revert.field,
                "optimistic mutation unconfirmed, reverted"
            );

            self.emit(ClientEvent::MutationReverted {
                info: MutationRevertInfo {
                    call_id: revert.call_id,
                    field: revert.field,
                    reverted_to: revert.prior,
                    timestamp: Utc::now(),
                },
                priority: EventPriority::High,
            })
            .await;
        }
    }

    /// The channel was down past the interruption threshold mid-call
    pub(crate) async fn force_interrupt(&self) {
        let interrupted = {
            let mut guard = self.session.write().await;
            match guard.take() {
                Some(session) => Some((session.call_id, session.state)),
                None => None,
            }
        };

        let Some((call_id, previous_state)) = interrupted else {
            return;
        };

        self.reconciler.clear_all();
        warn!(
            call_id = %call_id.as_ref().map(|c| c.to_string()).unwrap_or_else(|| "unassigned".to_string()),
            "connection down past threshold, call interrupted"
        );

        self.emit(ClientEvent::CallStateChanged {
            info: CallStatusInfo {
                call_id,
                new_state: CallState::Ended,
                previous_state: Some(previous_state),
                reason: Some("call interrupted".to_string()),
                timestamp: Utc::now(),
            },
            priority: EventPriority::Critical,
        })
        .await;
    }

    /// Synchronous teardown on stop/logout: reset the session quietly and
    /// drop all pending mutations
    pub(crate) async fn teardown(&self) {
        *self.session.write().await = None;
        self.reconciler.clear_all();
    }
}
