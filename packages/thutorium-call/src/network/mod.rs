//! # Network Module
//!
//! Signaling transport to the relay server.
//!
//! ## Signaling Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SIGNALING FLOW                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Caller (A)                  Relay                    Callee (B)       │
//! │  ──────────                  ─────                    ──────────       │
//! │                                                                         │
//! │  connect ?userId=u1 ───────►  register u1                              │
//! │              ◄─────────────── me{connectionId}                         │
//! │                                                                         │
//! │  callUser{toUserId:u2,  ───► lookup u2 ──────────► callUser{signal,    │
//! │    signalData: offer}                                from:u1, name}    │
//! │                                                                         │
//! │              ◄─────────────── callAccepted ◄──── answerCall{signal,    │
//! │                                 {signal}            to:u1}             │
//! │                                                                         │
//! │  ═════════════ media flows peer-to-peer, never via relay ════════════  │
//! │                                                                         │
//! │  callEnded{to:u2} ─────────► forward ────────────► callEnded{from:u1}  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A miss (`callUser` to a user with no live connection) is answered with
//! `userNotFound{userId}` to the caller only. Nothing is queued.

pub mod relay_client;

pub use relay_client::{
    EndReason, RelayClient, RelayClientMessage, RelaySender, RelayServerMessage, RelayStatus,
    SharedRelayStatus, SignalData,
};
