//! Relay delivery errors.
//!
//! Forwarding is fire-and-forget: these errors are logged and swallowed by
//! the routing layer, never propagated to the connection loop.

use thiserror::Error;

/// Why a message could not be handed to a connection's writer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The connection is not (or no longer) registered with the relay.
    #[error("connection {0} is not present")]
    NotPresent(String),

    /// The connection is registered but its writer task has shut down.
    #[error("connection {0} is closed")]
    Closed(String),
}
