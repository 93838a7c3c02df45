//! Error types and handling for the client-core library
//!
//! This module defines all error types that can occur during signaling
//! operations and provides guidance on how to handle them.
//!
//! # Error Categories
//!
//! Errors are categorized to help with recovery strategies:
//!
//! - **Authentication Errors** - Credential rejected; fatal to the
//!   connection, resolved by refreshing the credential and reopening
//! - **Network Errors** - Temporary channel issues, recoverable with the
//!   bounded reconnect/backoff policy
//! - **Precondition Errors** - Invalid operation for the current call
//!   state; rejected synchronously at the call site, never sent on the wire
//! - **Protocol Errors** - Malformed or unexpected channel messages
//! - **Configuration Errors** - Invalid settings, can't recover without
//!   fixing the configuration
//!
//! # Propagation Policy
//!
//! Failures affecting shared state (the connection, the call session) are
//! handled by the owning component and exposed as state or events, not as
//! errors crossing component boundaries. Callers only match on errors for
//! synchronous precondition rejections:
//!
//! ```rust,no_run
//! # use calldesk_client_core::{CallClient, ClientError};
//! # use std::sync::Arc;
//! # async fn example(client: Arc<CallClient>) {
//! match client.start_call("+15550100", Default::default()).await {
//!     Ok(()) => {}
//!     Err(ClientError::CallAlreadyActive { current_state }) => {
//!         eprintln!("end the current call first (state: {current_state:?})");
//!     }
//!     Err(e) => eprintln!("call setup failed: {e}"),
//! }
//! # }
//! ```

use thiserror::Error;

use crate::call::CallState;
use calldesk_signal_core::{CallId, WireError};

/// Result type alias for client-core operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Comprehensive error types for signaling client operations
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// Authentication related errors
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    /// Channel/connection errors
    #[error("Not connected to the signaling channel")]
    NotConnected,

    #[error("Connection closed: {reason}")]
    ConnectionClosed { reason: String },

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Network error: {reason}")]
    NetworkError { reason: String },

    #[error("Reconnect attempts exhausted after {attempts} tries")]
    RetriesExhausted { attempts: u32 },

    /// Call related errors
    #[error("No active call")]
    NoActiveCall,

    #[error("Call not found: {call_id}")]
    CallNotFound { call_id: CallId },

    #[error("A call is already in progress (state: {current_state:?})")]
    CallAlreadyActive { current_state: CallState },

    #[error("Call id mismatch: expected {expected}, got {actual}")]
    CallIdMismatch { expected: CallId, actual: CallId },

    #[error("Invalid call state: expected {expected}, got {actual}")]
    InvalidCallState { expected: String, actual: String },

    /// Protocol errors
    #[error("Protocol error: {reason}")]
    ProtocolError { reason: String },

    /// Error reported by the server over the channel
    #[error("Server error: {message}")]
    ServerReported { message: String },

    /// Configuration errors
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Missing required configuration: {field}")]
    MissingConfiguration { field: String },

    /// Generic errors
    #[error("Internal error: {message}")]
    InternalError { message: String },

    #[error("Operation timeout after {duration_ms}ms")]
    OperationTimeout { duration_ms: u64 },
}

impl ClientError {
    /// Create an authentication failed error
    pub fn authentication_failed(reason: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            reason: reason.into(),
        }
    }

    /// Create a network error
    pub fn network_error(reason: impl Into<String>) -> Self {
        Self::NetworkError {
            reason: reason.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol_error(reason: impl Into<String>) -> Self {
        Self::ProtocolError {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal_error(reason: impl Into<String>) -> Self {
        Self::InternalError {
            message: reason.into(),
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors are transient channel conditions that the bounded
    /// reconnect policy is expected to clear. Non-recoverable errors need a
    /// configuration fix, a credential refresh, or a different operation.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::NetworkError { .. }
            | ClientError::ConnectionTimeout
            | ClientError::ConnectionClosed { .. }
            | ClientError::NotConnected
            | ClientError::OperationTimeout { .. } => true,

            ClientError::AuthenticationFailed { .. }
            | ClientError::InvalidConfiguration { .. }
            | ClientError::MissingConfiguration { .. }
            | ClientError::RetriesExhausted { .. } => false,

            // Context-dependent errors
            _ => false,
        }
    }

    /// Check if error indicates an authentication issue
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ClientError::AuthenticationFailed { .. })
    }

    /// Check if error is a synchronous call-precondition rejection
    pub fn is_call_error(&self) -> bool {
        matches!(
            self,
            ClientError::NoActiveCall
                | ClientError::CallNotFound { .. }
                | ClientError::CallAlreadyActive { .. }
                | ClientError::CallIdMismatch { .. }
                | ClientError::InvalidCallState { .. }
        )
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::AuthenticationFailed { .. } => "authentication",

            ClientError::NotConnected
            | ClientError::ConnectionClosed { .. }
            | ClientError::ConnectionTimeout
            | ClientError::NetworkError { .. }
            | ClientError::RetriesExhausted { .. } => "network",

            ClientError::NoActiveCall
            | ClientError::CallNotFound { .. }
            | ClientError::CallAlreadyActive { .. }
            | ClientError::CallIdMismatch { .. }
            | ClientError::InvalidCallState { .. } => "call",

            ClientError::ProtocolError { .. } | ClientError::ServerReported { .. } => "protocol",

            ClientError::InvalidConfiguration { .. } | ClientError::MissingConfiguration { .. } => {
                "configuration"
            }

            ClientError::InternalError { .. } | ClientError::OperationTimeout { .. } => "system",
        }
    }
}

impl From<WireError> for ClientError {
    fn from(err: WireError) -> Self {
        ClientError::ProtocolError {
            reason: err.to_string(),
        }
    }
}
