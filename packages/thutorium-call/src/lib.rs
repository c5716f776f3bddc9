//! # Thutorium Call
//!
//! Client side of Thutorium's tutor/student video calls: a connection to the
//! signaling relay and the call session driven over it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       THUTORIUM CALL MODULES                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │    View     │  │    State    │  │    Media    │  │     Peer     │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Prompt    │  │ - States    │  │ - Streams   │  │ - Offer      │   │
//! │  │ - Buttons   │  │ - Events    │  │ - Tracks    │  │ - Answer     │   │
//! │  │ - Toggles   │  │ - Effects   │  │ - Toggles   │  │ - Remote     │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴───────┬────────┴────────────────┘           │
//! │                                  │                                      │
//! │                         ┌────────┴────────┐                             │
//! │                         │    CallAgent    │                             │
//! │                         └────────┬────────┘                             │
//! │                                  │                                      │
//! │  ┌───────────────────────────────┴────────────────────────────────────┐ │
//! │  │                           Network                                   │ │
//! │  │  - WebSocket to the relay (tokio-tungstenite)                      │ │
//! │  │  - callUser / answerCall / callEnded envelopes                     │ │
//! │  │  - Keep-alive pings                                                │ │
//! │  └─────────────────────────────────────────────────────────────────────┘ │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Client configuration
//! - [`network`] - Relay connection and wire envelopes
//! - [`call`] - Call state machine, agent, media and peer seams
//! - [`testing`] - In-memory media devices and peer transports
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use thutorium_call::{CallAgent, CallConfig};
//!
//! let config = CallConfig::for_user("12").with_display_name("Tutor Ann");
//! let agent = CallAgent::connect(config, devices, connector).await?;
//! agent.place_call("34").await?;
//! ```

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod call;
pub mod config;
pub mod error;
pub mod network;
pub mod testing;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use call::{CallAgent, CallState, CallTarget, CallView};
pub use config::CallConfig;
pub use error::{Error, Result};

/// Returns the version of the call client
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
