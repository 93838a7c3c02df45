//! Client builder for creating signaling clients
//!
//! Fluent builder interface over [`ClientConfig`] with sensible defaults.
//! Tests inject a channel-backed transport through [`ClientBuilder::transport`].

use std::sync::Arc;
use std::time::Duration;

use crate::error::ClientResult;
use crate::transport::Transport;

use super::config::ClientConfig;
use super::manager::CallClient;
use super::recovery::RetryConfig;

/// Builder for [`CallClient`]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ClientConfig::new(),
            transport: None,
        }
    }

    /// Set the backend base URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    /// Set the user agent string
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the optimistic-mutation timeout
    pub fn mutation_timeout(mut self, timeout: Duration) -> Self {
        self.config.mutation_timeout = timeout;
        self
    }

    /// Set the call-interruption threshold
    pub fn interruption_threshold(mut self, threshold: Duration) -> Self {
        self.config.interruption_threshold = threshold;
        self
    }

    /// Set the reconnect schedule
    pub fn reconnect(mut self, retry: RetryConfig) -> Self {
        self.config.reconnect = retry;
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom transport (tests)
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client
    pub async fn build(self) -> ClientResult<Arc<CallClient>> {
        match self.transport {
            Some(transport) => CallClient::with_transport(self.config, transport),
            None => CallClient::new(self.config),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
