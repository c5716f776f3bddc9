//! # Call State Machine
//!
//! One call session per client, modelled as a tagged enum with a pure
//! transition function. Side effects (media capture, peer transports, relay
//! sends) are returned as [`Effect`]s and executed by the
//! [`CallAgent`](crate::call::agent::CallAgent) shell.
//!
//! ## States
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CALL STATES                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │            placeCall                      receive callUser             │
//! │   ┌──────┐ ─────────► ┌─────────┐    ┌──────┐ ─────────► ┌─────────┐    │
//! │   │ Idle │            │ Placing │    │ Idle │            │ Ringing │    │
//! │   └──────┘            └────┬────┘    └──────┘            └────┬────┘    │
//! │                 offer sent │                           accept │         │
//! │                            ▼                                  │         │
//! │                   ┌────────────────┐  callAccepted            │         │
//! │                   │ AwaitingAnswer │ ─────────────┐           │         │
//! │                   └────────────────┘              ▼           ▼         │
//! │                                              ┌──────────────────┐       │
//! │                                              │      Active      │       │
//! │                                              └──────────────────┘       │
//! │                                                                         │
//! │   Every non-terminal state ──► Ended   (hangup, reject, cancel,        │
//! │                                          remote callEnded)              │
//! │                            ──► Failed  (media, peer transport,         │
//! │                                          userNotFound, relay loss)      │
//! │                                                                         │
//! │   Both terminal paths destroy the peer transport and release media.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A client holds at most one non-terminal session. A second incoming call
//! is answered with `callEnded{reason: busy}` and leaves the current session
//! untouched.

use crate::call::media::{MediaFlags, TrackKind};
use crate::error::Error;
use crate::network::{EndReason, RelayClientMessage, SignalData};

/// Which side of the call this client is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    Caller,
    Callee,
}

/// How an outgoing call addresses the callee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// A registered user id.
    User(String),
    /// A raw relay connection id shared out of band (no-login variant).
    Connection(String),
}

impl CallTarget {
    pub fn id(&self) -> &str {
        match self {
            CallTarget::User(id) | CallTarget::Connection(id) => id,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEnd {
    /// This client hung up, cancelled or rejected.
    Local(EndReason),
    /// The counterpart ended the call (or its connection dropped).
    Remote(Option<EndReason>),
    /// The peer transport closed underneath an active call.
    TransportClosed,
}

/// State of the client's call session.
#[derive(Debug, Clone, PartialEq)]
pub enum CallState {
    /// No call.
    Idle,

    /// Outgoing call: acquiring media, then waiting for the local offer.
    Placing {
        target: CallTarget,
        /// Display name sent to the callee.
        name: String,
        /// Own id, echoed as informational `from`.
        from: Option<String>,
        media: MediaFlags,
        media_ready: bool,
    },

    /// Outgoing call: offer delivered to the relay, waiting for the answer.
    AwaitingAnswer { peer: String, media: MediaFlags },

    /// Incoming call waiting for the user to accept or reject.
    Ringing {
        peer: String,
        caller_name: String,
        offer: SignalData,
        media: MediaFlags,
        media_ready: bool,
        /// Accepted before local media was ready; the answering transport
        /// is created as soon as media arrives.
        accepted: bool,
    },

    /// Call in progress.
    Active {
        role: CallRole,
        peer: String,
        media: MediaFlags,
        remote_attached: bool,
    },

    /// Terminal: ended normally.
    Ended {
        role: CallRole,
        peer: String,
        end: CallEnd,
    },

    /// Terminal: failed.
    Failed { peer: Option<String>, error: Error },
}

impl CallState {
    /// Short state name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Placing { .. } => "placing",
            CallState::AwaitingAnswer { .. } => "awaiting answer",
            CallState::Ringing { .. } => "ringing",
            CallState::Active { .. } => "active",
            CallState::Ended { .. } => "ended",
            CallState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended { .. } | CallState::Failed { .. })
    }

    /// Idle or terminal: a new session may start.
    pub fn is_vacant(&self) -> bool {
        matches!(self, CallState::Idle) || self.is_terminal()
    }

    /// The counterpart's id, when known.
    pub fn peer(&self) -> Option<&str> {
        match self {
            CallState::Idle => None,
            CallState::Placing { target, .. } => Some(target.id()),
            CallState::AwaitingAnswer { peer, .. }
            | CallState::Ringing { peer, .. }
            | CallState::Active { peer, .. }
            | CallState::Ended { peer, .. } => Some(peer),
            CallState::Failed { peer, .. } => peer.as_deref(),
        }
    }

    /// Local media flags of a live session.
    pub fn media(&self) -> Option<MediaFlags> {
        match self {
            CallState::Placing { media, .. }
            | CallState::AwaitingAnswer { media, .. }
            | CallState::Ringing { media, .. }
            | CallState::Active { media, .. } => Some(*media),
            _ => None,
        }
    }

    fn media_mut(&mut self) -> Option<&mut MediaFlags> {
        match self {
            CallState::Placing { media, .. }
            | CallState::AwaitingAnswer { media, .. }
            | CallState::Ringing { media, .. }
            | CallState::Active { media, .. } => Some(media),
            _ => None,
        }
    }
}

/// Inputs to the state machine: user commands, relay messages, and media or
/// peer-transport completions.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    // ── User commands ─────────────────────────────────────────────────────
    PlaceCall {
        target: CallTarget,
        name: String,
        from: Option<String>,
    },
    Accept,
    Reject,
    Hangup,
    ToggleVideo,
    ToggleAudio,

    // ── Relay ─────────────────────────────────────────────────────────────
    IncomingCall {
        from: String,
        name: String,
        signal: SignalData,
    },
    CallAccepted(SignalData),
    CallEnded {
        from: Option<String>,
        reason: Option<EndReason>,
    },
    UserNotFound(String),
    RelayDisconnected,

    // ── Media / peer transport ────────────────────────────────────────────
    MediaAcquired,
    MediaFailed(String),
    LocalSignal(SignalData),
    RemoteStream,
    PeerClosed,
    PeerError(String),
}

/// Side effects requested by a transition, executed in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start acquiring local camera and microphone.
    AcquireMedia,
    /// Create the peer transport over the local media.
    CreatePeer { initiator: bool },
    /// Feed a remote session description to the peer transport.
    ApplyRemoteSignal(SignalData),
    /// Send an envelope to the relay.
    Send(RelayClientMessage),
    /// Enable or disable local tracks of one kind.
    SetTrackEnabled { kind: TrackKind, enabled: bool },
    /// Keep the remote stream just reported and render it.
    AttachRemoteMedia,
    /// Destroy the peer transport.
    DestroyPeer,
    /// Stop local media and drop the remote stream.
    ReleaseMedia,
}

/// Check a user command against the current state before dispatching it.
pub fn validate(state: &CallState, event: &CallEvent) -> Result<(), Error> {
    let ok = match event {
        CallEvent::PlaceCall { .. } => {
            return if state.is_vacant() {
                Ok(())
            } else {
                Err(Error::SessionBusy)
            };
        }
        CallEvent::Accept => matches!(state, CallState::Ringing { accepted: false, .. }),
        CallEvent::Reject => matches!(state, CallState::Ringing { .. }),
        CallEvent::Hangup | CallEvent::ToggleVideo | CallEvent::ToggleAudio => {
            !state.is_vacant()
        }
        _ => true,
    };

    if ok {
        Ok(())
    } else if state.is_vacant() {
        Err(Error::NoActiveCall)
    } else {
        Err(Error::InvalidTransition {
            action: command_name(event),
            state: state.name(),
        })
    }
}

fn command_name(event: &CallEvent) -> &'static str {
    match event {
        CallEvent::PlaceCall { .. } => "place a call",
        CallEvent::Accept => "accept",
        CallEvent::Reject => "reject",
        CallEvent::Hangup => "hang up",
        CallEvent::ToggleVideo => "toggle video",
        CallEvent::ToggleAudio => "toggle audio",
        _ => "handle event",
    }
}

/// Pure transition: the next state and the effects to run.
///
/// Events that do not apply to the current state are ignored (the state is
/// returned unchanged with no effects).
pub fn transition(state: CallState, event: CallEvent) -> (CallState, Vec<Effect>) {
    use CallState::*;

    // A finished session behaves like Idle for anything that starts a new one.
    if state.is_terminal()
        && matches!(
            event,
            CallEvent::PlaceCall { .. } | CallEvent::IncomingCall { .. }
        )
    {
        return transition(Idle, event);
    }

    match (state, event) {
        // ── Starting a session ───────────────────────────────────────────
        (Idle, CallEvent::PlaceCall { target, name, from }) => (
            Placing {
                target,
                name,
                from,
                media: MediaFlags::default(),
                media_ready: false,
            },
            vec![Effect::AcquireMedia],
        ),

        (Idle, CallEvent::IncomingCall { from, name, signal }) => (
            Ringing {
                peer: from,
                caller_name: name,
                offer: signal,
                media: MediaFlags::default(),
                media_ready: false,
                accepted: false,
            },
            vec![Effect::AcquireMedia],
        ),

        // Busy: one live session at a time.
        (state, CallEvent::IncomingCall { from, .. }) if !state.is_vacant() => {
            tracing::info!(from = from.as_str(), state = state.name(), "Rejecting call: busy");
            let reply = send_call_ended(&from, EndReason::Busy);
            (state, vec![reply])
        }

        // ── Caller ───────────────────────────────────────────────────────
        (
            Placing {
                target,
                name,
                from,
                media,
                media_ready: false,
            },
            CallEvent::MediaAcquired,
        ) => {
            let mut effects = restore_track_flags(media);
            effects.push(Effect::CreatePeer { initiator: true });
            (
                Placing {
                    target,
                    name,
                    from,
                    media,
                    media_ready: true,
                },
                effects,
            )
        }

        (
            Placing {
                target,
                name,
                from,
                media,
                media_ready: true,
            },
            CallEvent::LocalSignal(offer),
        ) => {
            let peer = target.id().to_string();
            let (to_user_id, socket_id) = match target {
                CallTarget::User(id) => (Some(id), None),
                CallTarget::Connection(id) => (None, Some(id)),
            };
            (
                AwaitingAnswer { peer, media },
                vec![Effect::Send(RelayClientMessage::CallUser {
                    to_user_id,
                    socket_id,
                    signal_data: offer,
                    from,
                    name,
                })],
            )
        }

        // The callee has not been told yet: nothing to notify.
        (Placing { target, .. }, CallEvent::Hangup) => (
            Ended {
                role: CallRole::Caller,
                peer: target.id().to_string(),
                end: CallEnd::Local(EndReason::Cancelled),
            },
            teardown(),
        ),

        (Placing { target, .. }, CallEvent::MediaFailed(reason)) => (
            Failed {
                peer: Some(target.id().to_string()),
                error: Error::MediaAcquisition(reason),
            },
            teardown(),
        ),

        (Placing { target, .. }, CallEvent::PeerError(reason)) => (
            Failed {
                peer: Some(target.id().to_string()),
                error: Error::PeerTransport(reason),
            },
            teardown(),
        ),

        (AwaitingAnswer { peer, media }, CallEvent::CallAccepted(answer)) => (
            Active {
                role: CallRole::Caller,
                peer,
                media,
                remote_attached: false,
            },
            vec![Effect::ApplyRemoteSignal(answer)],
        ),

        (AwaitingAnswer { peer, .. }, CallEvent::Hangup) => {
            let mut effects = vec![send_call_ended(&peer, EndReason::Cancelled)];
            effects.extend(teardown());
            (
                Ended {
                    role: CallRole::Caller,
                    peer,
                    end: CallEnd::Local(EndReason::Cancelled),
                },
                effects,
            )
        }

        (AwaitingAnswer { peer, media }, CallEvent::UserNotFound(user_id)) => {
            if user_id != peer {
                return (AwaitingAnswer { peer, media }, vec![]);
            }
            (
                Failed {
                    peer: Some(peer),
                    error: Error::TargetNotPresent(user_id),
                },
                teardown(),
            )
        }

        (AwaitingAnswer { peer, .. }, CallEvent::PeerError(reason)) => {
            fail_notifying(peer, Error::PeerTransport(reason))
        }

        // ── Callee ───────────────────────────────────────────────────────
        (
            Ringing {
                peer,
                caller_name,
                offer,
                media,
                media_ready: false,
                accepted,
            },
            CallEvent::MediaAcquired,
        ) => {
            let mut effects = restore_track_flags(media);
            if accepted {
                effects.extend(answer_effects(&offer));
                return (
                    Active {
                        role: CallRole::Callee,
                        peer,
                        media,
                        remote_attached: false,
                    },
                    effects,
                );
            }
            (
                Ringing {
                    peer,
                    caller_name,
                    offer,
                    media,
                    media_ready: true,
                    accepted,
                },
                effects,
            )
        }

        (
            Ringing {
                peer,
                offer,
                media,
                media_ready: true,
                accepted: false,
                ..
            },
            CallEvent::Accept,
        ) => (
            Active {
                role: CallRole::Callee,
                peer,
                media,
                remote_attached: false,
            },
            answer_effects(&offer),
        ),

        (
            Ringing {
                peer,
                caller_name,
                offer,
                media,
                media_ready: false,
                accepted: false,
            },
            CallEvent::Accept,
        ) => (
            Ringing {
                peer,
                caller_name,
                offer,
                media,
                media_ready: false,
                accepted: true,
            },
            vec![],
        ),

        (Ringing { peer, .. }, CallEvent::Reject | CallEvent::Hangup) => {
            let mut effects = vec![send_call_ended(&peer, EndReason::Rejected)];
            effects.extend(teardown());
            (
                Ended {
                    role: CallRole::Callee,
                    peer,
                    end: CallEnd::Local(EndReason::Rejected),
                },
                effects,
            )
        }

        (Ringing { peer, .. }, CallEvent::MediaFailed(reason)) => {
            fail_notifying(peer, Error::MediaAcquisition(reason))
        }

        // ── Active ───────────────────────────────────────────────────────
        (
            Active {
                role: CallRole::Callee,
                peer,
                media,
                remote_attached,
            },
            CallEvent::LocalSignal(answer),
        ) => {
            let send = Effect::Send(RelayClientMessage::AnswerCall {
                signal: answer,
                to: peer.clone(),
            });
            (
                Active {
                    role: CallRole::Callee,
                    peer,
                    media,
                    remote_attached,
                },
                vec![send],
            )
        }

        (
            Active {
                role,
                peer,
                media,
                remote_attached: false,
            },
            CallEvent::RemoteStream,
        ) => (
            Active {
                role,
                peer,
                media,
                remote_attached: true,
            },
            vec![Effect::AttachRemoteMedia],
        ),

        (Active { role, peer, .. }, CallEvent::Hangup) => {
            let mut effects = vec![send_call_ended(&peer, EndReason::Hangup)];
            effects.extend(teardown());
            (
                Ended {
                    role,
                    peer,
                    end: CallEnd::Local(EndReason::Hangup),
                },
                effects,
            )
        }

        (Active { role, peer, .. }, CallEvent::PeerClosed) => {
            let mut effects = vec![send_call_ended(&peer, EndReason::Hangup)];
            effects.extend(teardown());
            (
                Ended {
                    role,
                    peer,
                    end: CallEnd::TransportClosed,
                },
                effects,
            )
        }

        (Active { peer, .. }, CallEvent::PeerError(reason)) => {
            fail_notifying(peer, Error::PeerTransport(reason))
        }

        // ── Any live session ─────────────────────────────────────────────
        (mut state, event @ (CallEvent::ToggleVideo | CallEvent::ToggleAudio)) => {
            let kind = if event == CallEvent::ToggleVideo {
                TrackKind::Video
            } else {
                TrackKind::Audio
            };
            match state.media_mut() {
                Some(media) => {
                    let enabled = media.toggle(kind);
                    (state, vec![Effect::SetTrackEnabled { kind, enabled }])
                }
                None => (state, vec![]),
            }
        }

        (state, CallEvent::CallEnded { from, reason }) if !state.is_vacant() => {
            let matches_peer = match (&from, state.peer()) {
                (None, _) => true,
                (Some(from), Some(peer)) => from == peer,
                (Some(_), None) => false,
            };
            if !matches_peer {
                tracing::debug!(
                    from = from.as_deref().unwrap_or("-"),
                    "Ignoring callEnded from someone other than the call peer"
                );
                return (state, vec![]);
            }

            let role = session_role(&state);
            let peer = state.peer().unwrap_or_default().to_string();
            (
                Ended {
                    role,
                    peer,
                    end: CallEnd::Remote(reason),
                },
                teardown(),
            )
        }

        (state, CallEvent::RelayDisconnected) if !state.is_vacant() => {
            let peer = state.peer().map(str::to_string);
            (
                Failed {
                    peer,
                    error: Error::RelayDisconnected,
                },
                teardown(),
            )
        }

        (state, event) => {
            tracing::trace!(state = state.name(), "Ignoring event: {:?}", event);
            (state, vec![])
        }
    }
}

fn session_role(state: &CallState) -> CallRole {
    match state {
        CallState::Ringing { .. } => CallRole::Callee,
        CallState::Active { role, .. } | CallState::Ended { role, .. } => *role,
        _ => CallRole::Caller,
    }
}

fn teardown() -> Vec<Effect> {
    vec![Effect::DestroyPeer, Effect::ReleaseMedia]
}

fn send_call_ended(to: &str, reason: EndReason) -> Effect {
    Effect::Send(RelayClientMessage::CallEnded {
        to: Some(to.to_string()),
        reason: Some(reason),
    })
}

/// Fail a session the peer already knows about, telling it the call is over.
fn fail_notifying(peer: String, error: Error) -> (CallState, Vec<Effect>) {
    let mut effects = vec![send_call_ended(&peer, EndReason::Hangup)];
    effects.extend(teardown());
    (
        CallState::Failed {
            peer: Some(peer),
            error,
        },
        effects,
    )
}

fn answer_effects(offer: &SignalData) -> Vec<Effect> {
    vec![
        Effect::CreatePeer { initiator: false },
        Effect::ApplyRemoteSignal(offer.clone()),
    ]
}

/// Tracks come up enabled; re-apply anything the user muted before media
/// was ready.
fn restore_track_flags(media: MediaFlags) -> Vec<Effect> {
    [TrackKind::Video, TrackKind::Audio]
        .into_iter()
        .filter(|kind| !media.get(*kind))
        .map(|kind| Effect::SetTrackEnabled {
            kind,
            enabled: false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(state: CallState, events: Vec<CallEvent>) -> (CallState, Vec<Effect>) {
        let mut state = state;
        let mut all = Vec::new();
        for event in events {
            let (next, effects) = transition(state, event);
            state = next;
            all.extend(effects);
        }
        (state, all)
    }

    fn place(to: &str) -> CallEvent {
        CallEvent::PlaceCall {
            target: CallTarget::User(to.to_string()),
            name: "Alice".to_string(),
            from: Some("u1".to_string()),
        }
    }

    fn incoming(from: &str) -> CallEvent {
        CallEvent::IncomingCall {
            from: from.to_string(),
            name: "Alice".to_string(),
            signal: json!("OFFER1"),
        }
    }

    fn awaiting_answer() -> CallState {
        run(
            CallState::Idle,
            vec![
                place("u2"),
                CallEvent::MediaAcquired,
                CallEvent::LocalSignal(json!("OFFER1")),
            ],
        )
        .0
    }

    fn ringing_ready() -> CallState {
        run(CallState::Idle, vec![incoming("u1"), CallEvent::MediaAcquired]).0
    }

    #[test]
    fn test_place_call_acquires_media_first() {
        let (state, effects) = transition(CallState::Idle, place("u2"));
        assert!(matches!(state, CallState::Placing { media_ready: false, .. }));
        assert_eq!(effects, vec![Effect::AcquireMedia]);

        let (state, effects) = transition(state, CallEvent::MediaAcquired);
        assert!(matches!(state, CallState::Placing { media_ready: true, .. }));
        assert_eq!(effects, vec![Effect::CreatePeer { initiator: true }]);
    }

    #[test]
    fn test_offer_sends_call_user() {
        let (state, effects) = run(
            CallState::Idle,
            vec![
                place("u2"),
                CallEvent::MediaAcquired,
                CallEvent::LocalSignal(json!("OFFER1")),
            ],
        );

        assert!(matches!(state, CallState::AwaitingAnswer { ref peer, .. } if peer == "u2"));
        assert_eq!(
            effects.last(),
            Some(&Effect::Send(RelayClientMessage::CallUser {
                to_user_id: Some("u2".to_string()),
                socket_id: None,
                signal_data: json!("OFFER1"),
                from: Some("u1".to_string()),
                name: "Alice".to_string(),
            }))
        );
    }

    #[test]
    fn test_call_by_connection_id_uses_socket_id() {
        let (_, effects) = run(
            CallState::Idle,
            vec![
                CallEvent::PlaceCall {
                    target: CallTarget::Connection("c2".to_string()),
                    name: "Alice".to_string(),
                    from: None,
                },
                CallEvent::MediaAcquired,
                CallEvent::LocalSignal(json!("OFFER1")),
            ],
        );

        match effects.last() {
            Some(Effect::Send(RelayClientMessage::CallUser {
                to_user_id,
                socket_id,
                ..
            })) => {
                assert!(to_user_id.is_none());
                assert_eq!(socket_id.as_deref(), Some("c2"));
            }
            other => panic!("Expected callUser, got {:?}", other),
        }
    }

    #[test]
    fn test_call_accepted_activates_caller() {
        let (state, effects) = transition(awaiting_answer(), CallEvent::CallAccepted(json!("ANSWER1")));
        assert!(matches!(
            state,
            CallState::Active {
                role: CallRole::Caller,
                remote_attached: false,
                ..
            }
        ));
        assert_eq!(effects, vec![Effect::ApplyRemoteSignal(json!("ANSWER1"))]);

        let (state, effects) = transition(state, CallEvent::RemoteStream);
        assert!(matches!(state, CallState::Active { remote_attached: true, .. }));
        assert_eq!(effects, vec![Effect::AttachRemoteMedia]);
    }

    #[test]
    fn test_cancel_awaiting_answer_notifies_callee() {
        let (state, effects) = transition(awaiting_answer(), CallEvent::Hangup);
        assert_eq!(
            state,
            CallState::Ended {
                role: CallRole::Caller,
                peer: "u2".to_string(),
                end: CallEnd::Local(EndReason::Cancelled),
            }
        );
        assert_eq!(
            effects,
            vec![
                send_call_ended("u2", EndReason::Cancelled),
                Effect::DestroyPeer,
                Effect::ReleaseMedia,
            ]
        );
    }

    #[test]
    fn test_cancel_while_placing_is_silent() {
        let (state, _) = transition(CallState::Idle, place("u2"));
        let (state, effects) = transition(state, CallEvent::Hangup);
        assert!(state.is_terminal());
        assert_eq!(effects, teardown());
    }

    #[test]
    fn test_user_not_found_fails() {
        let (state, effects) =
            transition(awaiting_answer(), CallEvent::UserNotFound("u2".to_string()));
        assert_eq!(
            state,
            CallState::Failed {
                peer: Some("u2".to_string()),
                error: Error::TargetNotPresent("u2".to_string()),
            }
        );
        assert_eq!(effects, teardown());
    }

    #[test]
    fn test_user_not_found_for_other_target_is_ignored() {
        let (state, effects) =
            transition(awaiting_answer(), CallEvent::UserNotFound("u9".to_string()));
        assert!(matches!(state, CallState::AwaitingAnswer { .. }));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_media_failure_is_fatal() {
        let (state, _) = transition(CallState::Idle, place("u2"));
        let (state, effects) = transition(state, CallEvent::MediaFailed("denied".to_string()));
        assert_eq!(
            state,
            CallState::Failed {
                peer: Some("u2".to_string()),
                error: Error::MediaAcquisition("denied".to_string()),
            }
        );
        assert_eq!(effects, teardown());
    }

    #[test]
    fn test_incoming_call_rings_and_acquires_media() {
        let (state, effects) = transition(CallState::Idle, incoming("u1"));
        assert!(matches!(
            state,
            CallState::Ringing { ref peer, ref caller_name, media_ready: false, accepted: false, .. }
                if peer == "u1" && caller_name == "Alice"
        ));
        assert_eq!(effects, vec![Effect::AcquireMedia]);
    }

    #[test]
    fn test_accept_creates_answering_peer() {
        let (state, effects) = transition(ringing_ready(), CallEvent::Accept);
        assert!(matches!(state, CallState::Active { role: CallRole::Callee, .. }));
        assert_eq!(
            effects,
            vec![
                Effect::CreatePeer { initiator: false },
                Effect::ApplyRemoteSignal(json!("OFFER1")),
            ]
        );

        let (_, effects) = transition(state, CallEvent::LocalSignal(json!("ANSWER1")));
        assert_eq!(
            effects,
            vec![Effect::Send(RelayClientMessage::AnswerCall {
                signal: json!("ANSWER1"),
                to: "u1".to_string(),
            })]
        );
    }

    #[test]
    fn test_accept_before_media_is_deferred() {
        let (state, _) = transition(CallState::Idle, incoming("u1"));
        let (state, effects) = transition(state, CallEvent::Accept);
        assert!(matches!(state, CallState::Ringing { accepted: true, .. }));
        assert!(effects.is_empty());

        let (state, effects) = transition(state, CallEvent::MediaAcquired);
        assert!(matches!(state, CallState::Active { role: CallRole::Callee, .. }));
        assert_eq!(
            effects,
            vec![
                Effect::CreatePeer { initiator: false },
                Effect::ApplyRemoteSignal(json!("OFFER1")),
            ]
        );
    }

    #[test]
    fn test_reject_notifies_caller() {
        let (state, effects) = transition(ringing_ready(), CallEvent::Reject);
        assert_eq!(
            state,
            CallState::Ended {
                role: CallRole::Callee,
                peer: "u1".to_string(),
                end: CallEnd::Local(EndReason::Rejected),
            }
        );
        assert_eq!(effects[0], send_call_ended("u1", EndReason::Rejected));
        assert_eq!(&effects[1..], teardown().as_slice());
    }

    #[test]
    fn test_busy_auto_reject_keeps_session() {
        let active = run(
            awaiting_answer(),
            vec![CallEvent::CallAccepted(json!("ANSWER1"))],
        )
        .0;

        let (state, effects) = transition(active.clone(), incoming("u3"));
        assert_eq!(state, active);
        assert_eq!(effects, vec![send_call_ended("u3", EndReason::Busy)]);
    }

    #[test]
    fn test_remote_call_ended_while_ringing() {
        let (state, effects) = transition(
            ringing_ready(),
            CallEvent::CallEnded {
                from: Some("u1".to_string()),
                reason: Some(EndReason::Cancelled),
            },
        );
        assert_eq!(
            state,
            CallState::Ended {
                role: CallRole::Callee,
                peer: "u1".to_string(),
                end: CallEnd::Remote(Some(EndReason::Cancelled)),
            }
        );
        assert_eq!(effects, teardown());
    }

    #[test]
    fn test_call_ended_from_bystander_is_ignored() {
        let (state, effects) = transition(
            ringing_ready(),
            CallEvent::CallEnded {
                from: Some("u7".to_string()),
                reason: Some(EndReason::Disconnected),
            },
        );
        assert!(matches!(state, CallState::Ringing { .. }));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_call_ended_without_sender_ends_call() {
        let (state, _) = transition(
            awaiting_answer(),
            CallEvent::CallEnded {
                from: None,
                reason: None,
            },
        );
        assert!(matches!(state, CallState::Ended { end: CallEnd::Remote(None), .. }));
    }

    #[test]
    fn test_call_ended_while_idle_is_ignored() {
        let (state, effects) = transition(
            CallState::Idle,
            CallEvent::CallEnded {
                from: None,
                reason: None,
            },
        );
        assert_eq!(state, CallState::Idle);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_hangup_active_notifies_peer() {
        let active = run(
            ringing_ready(),
            vec![CallEvent::Accept, CallEvent::LocalSignal(json!("ANSWER1"))],
        )
        .0;
        let (state, effects) = transition(active, CallEvent::Hangup);
        assert!(matches!(
            state,
            CallState::Ended { end: CallEnd::Local(EndReason::Hangup), .. }
        ));
        assert_eq!(effects[0], send_call_ended("u1", EndReason::Hangup));
        assert!(effects.contains(&Effect::DestroyPeer));
        assert!(effects.contains(&Effect::ReleaseMedia));
    }

    #[test]
    fn test_toggle_video_twice_restores_flag() {
        let active = run(awaiting_answer(), vec![CallEvent::CallAccepted(json!("A"))]).0;

        let (state, effects) = transition(active, CallEvent::ToggleVideo);
        assert_eq!(state.media().unwrap().video, false);
        assert_eq!(
            effects,
            vec![Effect::SetTrackEnabled {
                kind: TrackKind::Video,
                enabled: false
            }]
        );

        let (state, effects) = transition(state, CallEvent::ToggleVideo);
        assert_eq!(state.media(), Some(MediaFlags::default()));
        assert_eq!(
            effects,
            vec![Effect::SetTrackEnabled {
                kind: TrackKind::Video,
                enabled: true
            }]
        );
    }

    #[test]
    fn test_mute_before_media_is_reapplied() {
        let (state, _) = run(CallState::Idle, vec![place("u2"), CallEvent::ToggleAudio]);
        let (_, effects) = transition(state, CallEvent::MediaAcquired);
        assert_eq!(
            effects,
            vec![
                Effect::SetTrackEnabled {
                    kind: TrackKind::Audio,
                    enabled: false
                },
                Effect::CreatePeer { initiator: true },
            ]
        );
    }

    #[test]
    fn test_peer_error_fails_and_notifies() {
        let active = run(awaiting_answer(), vec![CallEvent::CallAccepted(json!("A"))]).0;
        let (state, effects) = transition(active, CallEvent::PeerError("ice failed".to_string()));
        assert_eq!(
            state,
            CallState::Failed {
                peer: Some("u2".to_string()),
                error: Error::PeerTransport("ice failed".to_string()),
            }
        );
        assert_eq!(effects[0], send_call_ended("u2", EndReason::Hangup));
    }

    #[test]
    fn test_relay_loss_fails_live_session() {
        let (state, effects) = transition(ringing_ready(), CallEvent::RelayDisconnected);
        assert_eq!(
            state,
            CallState::Failed {
                peer: Some("u1".to_string()),
                error: Error::RelayDisconnected,
            }
        );
        assert_eq!(effects, teardown());

        let (state, effects) = transition(CallState::Idle, CallEvent::RelayDisconnected);
        assert_eq!(state, CallState::Idle);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_terminal_state_accepts_new_call() {
        let (ended, _) = transition(awaiting_answer(), CallEvent::Hangup);
        let (state, effects) = transition(ended, incoming("u3"));
        assert!(matches!(state, CallState::Ringing { .. }));
        assert_eq!(effects, vec![Effect::AcquireMedia]);
    }

    #[test]
    fn test_validate_commands() {
        assert_eq!(validate(&CallState::Idle, &place("u2")), Ok(()));
        assert_eq!(validate(&awaiting_answer(), &place("u3")), Err(Error::SessionBusy));
        assert_eq!(validate(&CallState::Idle, &CallEvent::Accept), Err(Error::NoActiveCall));
        assert_eq!(validate(&ringing_ready(), &CallEvent::Accept), Ok(()));
        assert_eq!(
            validate(&awaiting_answer(), &CallEvent::Accept),
            Err(Error::InvalidTransition {
                action: "accept",
                state: "awaiting answer",
            })
        );
        assert_eq!(validate(&CallState::Idle, &CallEvent::Hangup), Err(Error::NoActiveCall));
        assert_eq!(validate(&awaiting_answer(), &CallEvent::ToggleAudio), Ok(()));
    }
}
