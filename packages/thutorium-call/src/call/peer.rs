//! Peer transport abstraction.
//!
//! The media path is a WebRTC-style peer connection created per call. The
//! initiator produces an offer, the answerer consumes it and produces an
//! answer; both are carried as opaque [`SignalData`] over the relay. ICE
//! gathering completes before a signal is emitted (no trickle), so each side
//! emits exactly one signal.

use tokio::sync::mpsc;

use crate::call::media::MediaStream;
use crate::error::Result;
use crate::network::SignalData;

/// Events a peer transport reports back to the call agent.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local session description to deliver to the remote side.
    Signal(SignalData),
    /// The remote media stream became available.
    Stream(MediaStream),
    /// The connection closed.
    Close,
    /// Negotiation or transport failure.
    Error(String),
}

/// Options for creating a peer transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerOptions {
    /// The initiator emits the offer.
    pub initiator: bool,
    /// Emit candidates incrementally instead of one complete description.
    pub trickle: bool,
}

impl PeerOptions {
    pub fn initiator() -> Self {
        Self {
            initiator: true,
            trickle: false,
        }
    }

    pub fn answerer() -> Self {
        Self {
            initiator: false,
            trickle: false,
        }
    }
}

/// A live peer connection.
pub trait PeerTransport: Send {
    /// Apply a remote session description.
    fn signal(&mut self, data: SignalData) -> Result<()>;

    /// Close the connection and release its resources. Idempotent.
    fn destroy(&mut self);
}

/// Factory for peer transports.
pub trait PeerConnector: Send + Sync {
    /// Create a transport sending `local` media. Events are reported on
    /// `events` until the transport is destroyed.
    fn connect(
        &self,
        options: PeerOptions,
        local: &MediaStream,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Box<dyn PeerTransport>>;
}
