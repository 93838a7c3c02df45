//! Call operations for the client-core library
//!
//! This module contains all call-related operations: starting an outbound
//! call, answering or declining a ringing call, hanging up, and querying
//! the current session.
//!
//! # Call Management Overview
//!
//! - **Outbound calls**: `start_call()` — idle only, one call at a time
//! - **Inbound calls**: `answer_call()` / `decline_call()` on a ring
//! - **Call control**: `end_call()` terminates optimistically
//! - **Call information**: `current_call()` and `call_capabilities()`
//!
//! Precondition violations (starting while busy, answering the wrong id)
//! are rejected synchronously and never reach the wire. Transitions driven
//! here are optimistic; the authoritative server events delivered through
//! the signal handler always win.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! # use calldesk_client_core::{CallClient, ClientConfig};
//! # use std::collections::HashMap;
//! # async fn example(client: std::sync::Arc<CallClient>) -> Result<(), Box<dyn std::error::Error>> {
//! client.start_call("+15550100", HashMap::new()).await?;
//!
//! if let Some(call) = client.current_call().await {
//!     println!("call state: {}", call.state);
//! }
//!
//! client.end_call().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use chrono::Utc;
use tracing::info;

use crate::call::{CallId, CallSession, CallState};
use crate::error::{ClientError, ClientResult};
use crate::events::{CallStatusInfo, ClientEvent, EventPriority};
use calldesk_signal_core::{CallTargetPayload, ClientCommand, InitiateCallPayload};

use super::types::CallCapabilities;

/// Call operations implementation for CallClient
impl super::manager::CallClient {
    /// Start an outbound call
    ///
    /// Rejected synchronously when a session already exists (one call at a
    /// time — end the current call first) or when the client is not
    /// running. The session enters `Connecting` without a call id; the
    /// server's `joined-call` assigns the id and moves the call along.
    ///
    /// # Errors
    ///
    /// * [`ClientError::CallAlreadyActive`] - a session already exists
    /// * [`ClientError::NotConnected`] - the channel is down
    /// * [`ClientError::InternalError`] - the client was never started
    pub async fn start_call(
        &self,
        callee_number: &str,
        metadata: HashMap<String, String>,
    ) -> ClientResult<()> {
        if !self.is_running().await {
            return Err(ClientError::internal_error(
                "client is not started; call start() before placing calls",
            ));
        }
        if self.connection_state() != crate::connection::ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }

        {
            let mut guard = self.session.write().await;
            if let Some(existing) = &*guard {
                return Err(ClientError::CallAlreadyActive {
                    current_state: existing.state,
                });
            }
            let mut session = CallSession::outbound(callee_number);
            session.metadata = metadata.clone();
            *guard = Some(session);
        }

        {
            let mut stats = self.stats.lock().await;
            stats.total_calls += 1;
        }

        self.send_lossy(&ClientCommand::InitiateCall(InitiateCallPayload {
            callee_number: callee_number.to_string(),
            metadata,
        }));

        info!(callee = callee_number, "outbound call started");

        self.signal_handler
            .emit(ClientEvent::CallStateChanged {
                info: CallStatusInfo {
                    call_id: None,
                    new_state: CallState::Connecting,
                    previous_state: None,
                    reason: Some("call created".to_string()),
                    timestamp: Utc::now(),
                },
                priority: EventPriority::Normal,
            })
            .await;

        Ok(())
    }

    /// Answer the ringing inbound call
    ///
    /// The id must match the ringing session's id; answering a different
    /// call than the one ringing is a precondition violation, not a
    /// retryable error.
    ///
    /// # Errors
    ///
    /// * [`ClientError::NoActiveCall`] - nothing is ringing
    /// * [`ClientError::InvalidCallState`] - the session is not ringing
    /// * [`ClientError::CallIdMismatch`] - the id is not the ringing call
    pub async fn answer_call(&self, call_id: &CallId) -> ClientResult<()> {
        {
            let mut guard = self.session.write().await;
            let session = guard.as_mut().ok_or(ClientError::NoActiveCall)?;

            if session.state != CallState::Ringing {
                return Err(ClientError::InvalidCallState {
                    expected: "ringing".to_string(),
                    actual: session.state.to_string(),
                });
            }
            if !session.matches(call_id) {
                return Err(ClientError::CallIdMismatch {
                    expected: session
                        .call_id
                        .clone()
                        .unwrap_or_else(|| CallId::from("unassigned")),
                    actual: call_id.clone(),
                });
            }

            session.state = CallState::Connecting;
        }

        self.send_lossy(&ClientCommand::AnswerCall(CallTargetPayload {
            call_id: call_id.clone(),
        }));

        info!(call_id = %call_id, "answered call");

        self.signal_handler
            .emit(ClientEvent::CallStateChanged {
                info: CallStatusInfo {
                    call_id: Some(call_id.clone()),
                    new_state: CallState::Connecting,
                    previous_state: Some(CallState::Ringing),
                    reason: Some("answered".to_string()),
                    timestamp: Utc::now(),
                },
                priority: EventPriority::Normal,
            })
            .await;

        Ok(())
    }

    /// Decline the ringing inbound call
    ///
    /// # Errors
    ///
    /// * [`ClientError::NoActiveCall`] - nothing is ringing
    /// * [`ClientError::InvalidCallState`] - the session is not ringing
    pub async fn decline_call(&self, call_id: &CallId) -> ClientResult<()> {
        {
            let guard = self.session.read().await;
            let session = guard.as_ref().ok_or(ClientError::NoActiveCall)?;
            if session.state != CallState::Ringing {
                return Err(ClientError::InvalidCallState {
                    expected: "ringing".to_string(),
                    actual: session.state.to_string(),
                });
            }
            if !session.matches(call_id) {
                return Err(ClientError::CallIdMismatch {
                    expected: session
                        .call_id
                        .clone()
                        .unwrap_or_else(|| CallId::from("unassigned")),
                    actual: call_id.clone(),
                });
            }
        }

        self.end_call().await
    }

    /// End the current call
    ///
    /// The local transition to idle is optimistic: the session is cleared
    /// and all pending mutations dropped immediately, then `end-call` is
    /// fired at the backend. A later authoritative `call-ended` for the
    /// same id is a no-op.
    ///
    /// # Errors
    ///
    /// * [`ClientError::NoActiveCall`] - there is no call to end
    pub async fn end_call(&self) -> ClientResult<()> {
        let (call_id, previous_state) = {
            let mut guard = self.session.write().await;
            let session = guard.take().ok_or(ClientError::NoActiveCall)?;
            (session.call_id, session.state)
        };

        self.reconciler.clear_all();

        if let Some(call_id) = &call_id {
            self.send_lossy(&ClientCommand::EndCall(CallTargetPayload {
                call_id: call_id.clone(),
            }));
        }
        // With no id assigned yet there is nothing to address on the wire;
        // the backend abandons the half-open dial on its own

        info!(
            call_id = %call_id.as_ref().map(|c| c.to_string()).unwrap_or_else(|| "unassigned".to_string()),
            "call ended locally"
        );

        self.signal_handler
            .emit(ClientEvent::CallStateChanged {
                info: CallStatusInfo {
                    call_id,
                    new_state: CallState::Ended,
                    previous_state: Some(previous_state),
                    reason: Some("hangup".to_string()),
                    timestamp: Utc::now(),
                },
                priority: EventPriority::Normal,
            })
            .await;

        Ok(())
    }

    /// Snapshot of the current call session, if any
    pub async fn current_call(&self) -> Option<CallSession> {
        self.session.read().await.clone()
    }

    /// Operations currently possible for the session
    pub async fn call_capabilities(&self) -> CallCapabilities {
        match self.session.read().await.as_ref() {
            Some(session) => match session.state {
                CallState::Ringing => CallCapabilities {
                    can_answer: true,
                    can_end: true,
                    can_mute_audio: session.call_id.is_some(),
                    can_mute_video: session.call_id.is_some(),
                },
                CallState::Connecting | CallState::Active => CallCapabilities {
                    can_answer: false,
                    can_end: true,
                    can_mute_audio: session.call_id.is_some(),
                    can_mute_video: session.call_id.is_some(),
                },
                CallState::Ended => CallCapabilities::default(),
            },
            None => CallCapabilities::default(),
        }
    }
}
