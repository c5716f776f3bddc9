//! Signaling relay.
//!
//! Routes call envelopes between connections. The relay knows nothing about
//! call semantics beyond who is linked to whom: signal payloads are forwarded
//! verbatim and nothing is queued or retried. A forward to a connection that
//! vanished between lookup and send is logged and dropped.

use crate::protocol::{ClientMessage, EndReason, ServerMessage, SignalData};
use crate::registry::ConnectionId;
use crate::state::{ClientSender, DisconnectNotify, RelayState};

/// A client connected. Registers the optional user id and announces the
/// assigned connection id back to the client.
pub fn on_connect(state: &RelayState, user_id: Option<&str>, sender: ClientSender) -> ConnectionId {
    let connection_id = state.add_connection(user_id, sender);

    forward(
        state,
        &connection_id,
        ServerMessage::Me {
            connection_id: connection_id.clone(),
        },
    );

    connection_id
}

/// A client disconnected. Unregisters it and tells the other side(s) the
/// call is over, according to the configured notification policy.
pub fn on_disconnect(state: &RelayState, connection_id: &str) {
    let linked_peer = state.call_peer_of(connection_id);

    // Must be read before the entry goes away.
    let recipients: Vec<ConnectionId> = match state.config.disconnect_notify {
        DisconnectNotify::Broadcast => state.other_connections(connection_id),
        DisconnectNotify::Peer => {
            let mut targets = state.linked_to(connection_id);
            if let Some(peer) = linked_peer.clone() {
                if !targets.contains(&peer) {
                    targets.push(peer);
                }
            }
            targets
        }
    };
    let addressed: Vec<(ConnectionId, String)> = recipients
        .into_iter()
        .map(|recipient| {
            let address = state.address_for(connection_id, &recipient);
            (recipient, address)
        })
        .collect();

    state.remove_connection(connection_id);

    for peer in state.linked_to(connection_id) {
        state.unlink_call_peer_if(&peer, connection_id);
    }

    tracing::info!(
        connection_id = connection_id,
        notify = state.config.disconnect_notify.as_str(),
        recipients = addressed.len(),
        "Client disconnected, notifying call end"
    );

    for (recipient, address) in addressed {
        forward(
            state,
            &recipient,
            ServerMessage::CallEnded {
                from: Some(address),
                reason: Some(EndReason::Disconnected),
            },
        );
    }
}

/// Dispatch a parsed client message.
pub fn handle_client_message(state: &RelayState, from: &str, msg: ClientMessage) {
    match msg {
        ClientMessage::CallUser {
            to_user_id,
            socket_id,
            signal_data,
            from: _,
            name,
        } => {
            let target = match (to_user_id, socket_id) {
                (Some(user_id), _) => CallTarget::User(user_id),
                (None, Some(socket_id)) => CallTarget::Connection(socket_id),
                (None, None) => {
                    reply_error(state, from, "callUser requires toUserId or socketId");
                    return;
                }
            };
            on_place_call(state, from, target, signal_data, name.unwrap_or_default());
        }

        ClientMessage::AnswerCall { signal, to } => {
            on_answer(state, from, &to, signal);
        }

        ClientMessage::CallEnded { to, reason } => {
            on_call_ended(state, from, to.as_deref(), reason);
        }

        ClientMessage::Ping => {
            forward(state, from, ServerMessage::Pong);
        }
    }
}

/// How a `callUser` addresses its callee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// A registered user id, resolved through the presence registry.
    User(String),
    /// A raw connection id shared out of band.
    Connection(String),
}

impl CallTarget {
    fn as_str(&self) -> &str {
        match self {
            CallTarget::User(id) | CallTarget::Connection(id) => id,
        }
    }
}

// ── Message Handlers ──────────────────────────────────────────────────────────

/// Forward an incoming call to the callee, or tell the caller it is not there.
pub fn on_place_call(
    state: &RelayState,
    from: &str,
    target: CallTarget,
    signal: SignalData,
    name: String,
) {
    let resolved = match &target {
        CallTarget::User(user_id) => state.registry.lookup(user_id),
        CallTarget::Connection(id) => Some(id.clone()).filter(|id| state.is_connected(id)),
    };

    let envelope = ServerMessage::CallUser {
        signal,
        from: state.address_of(from),
        name,
    };

    let delivered = match resolved {
        Some(callee) => match state.send_to_connection(&callee, envelope) {
            Ok(()) => {
                tracing::debug!(from = from, to = callee.as_str(), "Forwarded call");
                state.link_call_peer(from, &callee, target.as_str());
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "Callee vanished before forward");
                false
            }
        },
        None => false,
    };

    if !delivered {
        tracing::info!(
            from = from,
            requested = target.as_str(),
            "No connection found for call target"
        );
        forward(
            state,
            from,
            ServerMessage::UserNotFound {
                user_id: target.as_str().to_string(),
            },
        );
    }
}

/// Forward an answer to the caller.
///
/// No check is made that the addressed connection ever placed a call to the
/// sender: a stray or forged answer is forwarded as-is.
pub fn on_answer(state: &RelayState, from: &str, to: &str, signal: SignalData) {
    let Some(caller) = state.resolve(to) else {
        tracing::debug!(from = from, to = to, "Answer target not present, dropping");
        return;
    };

    if forward(state, &caller, ServerMessage::CallAccepted { signal }) {
        state.link_call_peer(from, &caller, to);
        // Keep the reference the caller dialed, if it dialed this connection.
        if state.call_peer_of(&caller).as_deref() != Some(from) {
            state.link_call_peer(&caller, from, &state.address_of(from));
        }
    }
}

/// Forward a hang-up to the counterpart and clear the call link.
pub fn on_call_ended(state: &RelayState, from: &str, to: Option<&str>, reason: Option<EndReason>) {
    let target = match to {
        Some(reference) => state.resolve(reference),
        None => state.call_peer_of(from),
    };

    let Some(target) = target else {
        tracing::debug!(from = from, "Call end without a reachable counterpart");
        return;
    };

    let address = state.address_for(from, &target);

    // A busy reject to a third party leaves the sender's own call linked.
    state.unlink_call_peer_if(from, &target);
    state.unlink_call_peer_if(&target, from);
    forward(
        state,
        &target,
        ServerMessage::CallEnded {
            from: Some(address),
            reason,
        },
    );
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Fire-and-forget delivery. Returns whether the message reached the
/// connection's writer.
fn forward(state: &RelayState, to: &str, message: ServerMessage) -> bool {
    match state.send_to_connection(to, message) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping stale forward");
            false
        }
    }
}

fn reply_error(state: &RelayState, to: &str, message: &str) {
    forward(
        state,
        to,
        ServerMessage::Error {
            message: message.to_string(),
        },
    );
}
