//! # Call Module
//!
//! One-to-one video call sessions.
//!
//! - [`state`] - Pure call state machine
//! - [`agent`] - Effectful shell driving a session over the relay
//! - [`media`] - Local and remote media stream handles
//! - [`peer`] - Peer transport abstraction
//! - [`view`] - Render model for the call page

pub mod agent;
pub mod media;
pub mod peer;
pub mod state;
pub mod view;

pub use agent::CallAgent;
pub use media::{MediaConstraints, MediaDevices, MediaFlags, MediaStream, MediaTrack, TrackKind};
pub use peer::{PeerConnector, PeerEvent, PeerOptions, PeerTransport};
pub use state::{CallEnd, CallEvent, CallRole, CallState, CallTarget, Effect};
pub use view::{CallView, IncomingCallPrompt, PrimaryAction, ToggleButton};
