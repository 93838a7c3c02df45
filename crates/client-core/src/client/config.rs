//! Client configuration structures
//!
//! Configuration for the signaling client: endpoint addresses, the
//! optimistic-mutation timeout, the call-interruption threshold, and the
//! reconnect schedule. Builder-style `with_*` methods allow readable,
//! flexible setup with sensible defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::recovery::RetryConfig;
use crate::transport::ws_scheme_url;

/// Configuration for the signaling client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the backend (http(s) or ws(s) scheme)
    pub server_url: String,
    /// Path of the signaling endpoint appended to the base URL
    pub ws_path: String,
    /// User agent string
    pub user_agent: String,
    /// How long an optimistic mutation may stay unconfirmed before it is
    /// reverted
    pub mutation_timeout: Duration,
    /// How long the channel may stay down mid-call before the call is
    /// declared interrupted
    pub interruption_threshold: Duration,
    /// Reconnect schedule for the signaling channel (bounded)
    pub reconnect: RetryConfig,
    /// Capacity of the client event broadcast channel
    pub event_buffer: usize,
    /// How often pending mutations are checked for expiry
    pub sweep_interval: Duration,
}

impl ClientConfig {
    /// Create a new client configuration with defaults
    pub fn new() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            ws_path: "/ws".to_string(),
            user_agent: "calldesk-client-core/0.1.3".to_string(),
            mutation_timeout: Duration::from_secs(5),
            interruption_threshold: Duration::from_secs(15),
            reconnect: RetryConfig::slow(),
            event_buffer: 256,
            sweep_interval: Duration::from_millis(200),
        }
    }

    /// Set the backend base URL
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Set the signaling endpoint path
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the optimistic-mutation timeout
    pub fn with_mutation_timeout(mut self, timeout: Duration) -> Self {
        self.mutation_timeout = timeout;
        self
    }

    /// Set the call-interruption threshold
    pub fn with_interruption_threshold(mut self, threshold: Duration) -> Self {
        self.interruption_threshold = threshold;
        self
    }

    /// Set the reconnect schedule
    pub fn with_reconnect(mut self, reconnect: RetryConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the pending-mutation sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Full WebSocket URL of the signaling endpoint
    pub fn signaling_url(&self) -> String {
        let base = ws_scheme_url(self.server_url.trim_end_matches('/'));
        format!("{}{}", base, self.ws_path)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signaling_url_converts_scheme_and_appends_path() {
        let config = ClientConfig::new().with_server_url("https://api.example.com/");
        assert_eq!(config.signaling_url(), "wss://api.example.com/ws");
    }

    #[test]
    fn signaling_url_keeps_ws_scheme() {
        let config = ClientConfig::new()
            .with_server_url("ws://localhost:3000")
            .with_ws_path("/signal");
        assert_eq!(config.signaling_url(), "ws://localhost:3000/signal");
    }
}
