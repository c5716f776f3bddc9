//! # Error Handling
//!
//! Error types for the call client.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Call Errors (100-199)                                             │
//! │  │   ├── SessionBusy           - A call is already in progress         │
//! │  │   ├── NoActiveCall          - Operation needs a call                │
//! │  │   └── InvalidTransition     - Command not valid in current state    │
//! │  │                                                                      │
//! │  ├── Media Errors (200-299)                                            │
//! │  │   └── MediaAcquisition      - Camera/microphone unavailable         │
//! │  │                                                                      │
//! │  ├── Peer Errors (300-399)                                             │
//! │  │   └── PeerTransport         - Negotiation or transport failure      │
//! │  │                                                                      │
//! │  ├── Network Errors (500-599)                                          │
//! │  │   ├── NotConnected          - No relay connection                   │
//! │  │   ├── ConnectionFailed      - Could not reach the relay             │
//! │  │   ├── RelayDisconnected     - Relay went away mid-session           │
//! │  │   └── TargetNotPresent      - Callee has no live connection         │
//! │  │                                                                      │
//! │  └── Internal Errors (900-999)                                         │
//! │      └── SerializationError                                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every client-visible failure is terminal for the call session: it lands
//! in `CallState::Failed` and is never retried automatically.

use thiserror::Error;

/// Result type alias for call client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the call client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Call Errors (100-199)
    // ========================================================================

    /// A non-terminal call session already exists
    #[error("A call is already in progress.")]
    SessionBusy,

    /// No call session to act on
    #[error("No active call.")]
    NoActiveCall,

    /// The command does not apply to the current call state
    #[error("Cannot {action} while {state}.")]
    InvalidTransition {
        /// Command that was attempted
        action: &'static str,
        /// Name of the state it was attempted in
        state: &'static str,
    },

    // ========================================================================
    // Media Errors (200-299)
    // ========================================================================

    /// Local camera/microphone could not be acquired
    #[error("Failed to acquire local media: {0}")]
    MediaAcquisition(String),

    // ========================================================================
    // Peer Errors (300-399)
    // ========================================================================

    /// Peer transport negotiation or connection failure
    #[error("Peer transport error: {0}")]
    PeerTransport(String),

    // ========================================================================
    // Network Errors (500-599)
    // ========================================================================

    /// Not connected to the relay
    #[error("Not connected to the relay.")]
    NotConnected,

    /// Failed to connect to the relay
    #[error("Failed to connect to relay: {0}")]
    ConnectionFailed(String),

    /// Relay connection was lost during a call
    #[error("Relay connection lost.")]
    RelayDisconnected,

    /// The requested user has no live connection
    #[error("User not found: {0}")]
    TargetNotPresent(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Call session
    /// - 200-299: Media
    /// - 300-399: Peer transport
    /// - 500-599: Network
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Call (100-199)
            Error::SessionBusy => 100,
            Error::NoActiveCall => 101,
            Error::InvalidTransition { .. } => 102,

            // Media (200-299)
            Error::MediaAcquisition(_) => 200,

            // Peer (300-399)
            Error::PeerTransport(_) => 300,

            // Network (500-599)
            Error::NotConnected => 500,
            Error::ConnectionFailed(_) => 501,
            Error::RelayDisconnected => 502,
            Error::TargetNotPresent(_) => 503,

            // Internal (900-999)
            Error::SerializationError(_) => 900,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors can be resolved by the user trying again later;
    /// the failed session itself is never retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::SessionBusy
                | Error::TargetNotPresent(_)
                | Error::ConnectionFailed(_)
                | Error::RelayDisconnected
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::ConnectionFailed(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::SessionBusy.code(), 100);
        assert_eq!(Error::MediaAcquisition("denied".into()).code(), 200);
        assert_eq!(Error::PeerTransport("ice".into()).code(), 300);
        assert_eq!(Error::NotConnected.code(), 500);
        assert_eq!(Error::TargetNotPresent("ghost".into()).code(), 503);
        assert_eq!(Error::SerializationError("x".into()).code(), 900);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::TargetNotPresent("ghost".into()).is_recoverable());
        assert!(Error::RelayDisconnected.is_recoverable());
        assert!(!Error::MediaAcquisition("denied".into()).is_recoverable());
        assert!(!Error::PeerTransport("ice".into()).is_recoverable());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = Error::InvalidTransition {
            action: "accept",
            state: "idle",
        };
        assert_eq!(err.to_string(), "Cannot accept while idle.");
    }

    #[test]
    fn test_from_serde_json() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.code(), 900);
    }
}
