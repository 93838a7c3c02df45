//! High-level signaling client implementation
//!
//! This module provides the core client functionality for operator console
//! applications.
//!
//! # Architecture Overview
//!
//! The client module is organized into several sub-modules:
//!
//! - **`manager`** - The main CallClient that coordinates all operations
//! - **`calls`** - Call operations (start, answer, decline, end)
//! - **`controls`** - Mute toggles driven through the reconciler
//! - **`monitor`** - Queue/agent monitor passthroughs
//! - **`reconciler`** - Pending-mutation tracking and timeout reverts
//! - **`events`** - The bridge from wire events to client events
//! - **`recovery`** - Retry/backoff utilities
//!
//! # Usage Guide
//!
//! ## Basic Call Flow
//!
//! ```rust,no_run
//! # use calldesk_client_core::{ClientBuilder, ClientEvent, SessionCredential, call::CallState};
//! # use std::collections::HashMap;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // 1. Create the client
//! let client = ClientBuilder::new()
//!     .server_url("https://api.example.com")
//!     .user_agent("ConsoleApp/1.0")
//!     .build()
//!     .await?;
//!
//! // 2. Start it with the session credential
//! let credential = SessionCredential {
//!     access_token: "token".to_string(),
//!     refresh_token: None,
//!     user_id: "u1".to_string(),
//! };
//! client.start(&credential).await?;
//!
//! // 3. Subscribe to events
//! let mut events = client.subscribe_events();
//!
//! // 4. Place a call
//! client.start_call("+15550100", HashMap::new()).await?;
//!
//! // 5. Handle events
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let ClientEvent::CallStateChanged { info, .. } = event {
//!             match info.new_state {
//!                 CallState::Active => println!("call connected!"),
//!                 CallState::Ended => break,
//!                 _ => {}
//!             }
//!         }
//!     }
//! });
//!
//! // 6. Control the call
//! client.mute_audio().await?;
//! client.end_call().await?;
//! client.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Best Practices
//!
//! ### Always Handle Events
//!
//! The event system is how authoritative state reaches the surface; the
//! return value of a control operation only tells you the optimistic local
//! mutation was applied and the command fired.
//!
//! ### Proper Resource Cleanup
//!
//! Call [`CallClient::stop`] on logout or unmount: it closes the channel,
//! resets the session, drops pending mutations, and cancels every timer.

pub mod builder;
pub mod calls;
pub mod config;
pub mod controls;
pub mod events;
pub mod manager;
pub mod monitor;
pub mod reconciler;
pub mod recovery;
pub mod types;

pub use manager::CallClient;
pub use config::ClientConfig;

// Re-export all types from types.rs
pub use types::{CallCapabilities, ClientStats};

// Re-export event bridge from events.rs
pub use events::ClientSignalHandler;

// Re-export builder module
pub use builder::ClientBuilder;

// Re-export reconciler types
pub use reconciler::{ConfirmOutcome, PendingMutation, Reconciler, RevertedMutation};

// Re-export recovery utilities
pub use recovery::{retry_with_backoff, with_timeout, ErrorContext, RetryConfig};

// Type alias for convenient use
pub type Client = CallClient;
