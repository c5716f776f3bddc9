//! Server state management.
//!
//! Tracks live connections (with their outbound channels) and the presence
//! registry that aliases user ids to them. All data structures are concurrent
//! (DashMap) and owned by the `RelayState` handle created at process start.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::protocol::ServerMessage;
use crate::registry::{ConnectionId, PresenceRegistry, UserId};

/// Default listen port of the signaling relay.
const DEFAULT_PORT: u16 = 5001;

/// Default browser origin allowed by CORS.
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Who is told when a connection drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DisconnectNotify {
    /// Every other connected client receives `callEnded`.
    Broadcast,
    /// Only connections linked to the dropped one by a call receive `callEnded`.
    Peer,
}

impl DisconnectNotify {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectNotify::Broadcast => "broadcast",
            DisconnectNotify::Peer => "peer",
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    /// Allowed CORS origin; `*` allows any.
    pub cors_origin: String,
    pub disconnect_notify: DisconnectNotify,
    /// Reject connections that do not supply a `userId`.
    pub require_user_id: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
            disconnect_notify: DisconnectNotify::Broadcast,
            require_user_id: false,
        }
    }
}

/// A connected client's sender channel.
pub type ClientSender = mpsc::UnboundedSender<ServerMessage>;

/// One live transport session.
#[derive(Debug)]
pub struct ConnectionEntry {
    pub sender: ClientSender,
    /// User id supplied at connect time, absent in the no-login variant.
    pub user_id: Option<UserId>,
    pub connected_at: DateTime<Utc>,
    /// Connection this one is currently in a call with, as far as the relay
    /// has seen `callUser`/`answerCall` go by.
    pub active_call_peer: Option<ConnectionId>,
    /// The user id or connection id this client addressed its call peer by.
    pub active_call_ref: Option<String>,
}

/// Shared server state.
#[derive(Clone)]
pub struct RelayState {
    /// Connection id → live connection.
    pub connections: Arc<DashMap<ConnectionId, ConnectionEntry>>,

    /// User id → connection id.
    pub registry: PresenceRegistry,

    /// Server configuration.
    pub config: RelayConfig,
}

impl RelayState {
    /// Create a new relay state with the given configuration.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            registry: PresenceRegistry::new(),
            config,
        }
    }

    // ── Connection Management ─────────────────────────────────────────────

    /// Add a connection and, when a user id is supplied, alias it in the
    /// registry. Returns the freshly assigned connection id.
    pub fn add_connection(&self, user_id: Option<&str>, sender: ClientSender) -> ConnectionId {
        let connection_id = Uuid::new_v4().to_string();

        self.connections.insert(
            connection_id.clone(),
            ConnectionEntry {
                sender,
                user_id: user_id.map(str::to_string),
                connected_at: Utc::now(),
                active_call_peer: None,
                active_call_ref: None,
            },
        );

        if let Some(user_id) = user_id {
            self.registry.register(user_id, &connection_id);
        }

        tracing::info!(
            connection_id = connection_id.as_str(),
            user_id = user_id.unwrap_or("-"),
            "Connection added"
        );
        connection_id
    }

    /// Remove a connection and its registry alias.
    pub fn remove_connection(&self, connection_id: &str) -> Option<ConnectionEntry> {
        self.registry.unregister(connection_id);
        let removed = self.connections.remove(connection_id).map(|(_, entry)| entry);
        if removed.is_some() {
            tracing::info!(connection_id = connection_id, "Connection removed");
        }
        removed
    }

    /// Check if a connection is currently live.
    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Send a message to a live connection.
    ///
    /// Fails with [`DeliveryError::NotPresent`] when the connection is gone
    /// and [`DeliveryError::Closed`] when its writer already shut down.
    pub fn send_to_connection(
        &self,
        connection_id: &str,
        message: ServerMessage,
    ) -> Result<(), DeliveryError> {
        let entry = self
            .connections
            .get(connection_id)
            .ok_or_else(|| DeliveryError::NotPresent(connection_id.to_string()))?;

        entry
            .sender
            .send(message)
            .map_err(|_| DeliveryError::Closed(connection_id.to_string()))
    }

    /// Resolve a reference that may be a connection id or a user id.
    /// Connection ids take precedence.
    pub fn resolve(&self, reference: &str) -> Option<ConnectionId> {
        if self.connections.contains_key(reference) {
            return Some(reference.to_string());
        }
        self.registry.lookup(reference)
    }

    /// The address other clients know this connection by: its user id while
    /// the registry still maps that id to it, otherwise the connection id.
    /// An orphaned connection never speaks for its user.
    pub fn address_of(&self, connection_id: &str) -> String {
        let user_id = self
            .connections
            .get(connection_id)
            .and_then(|entry| entry.user_id.clone());

        match user_id {
            Some(user_id) if self.registry.lookup(&user_id).as_deref() == Some(connection_id) => {
                user_id
            }
            _ => connection_id.to_string(),
        }
    }

    /// The address to stamp on a message from `from` to `to`. When `to` is in
    /// a call with `from`, this is the reference `to` used for it, so the
    /// recipient can match the sender against its own session.
    pub fn address_for(&self, from: &str, to: &str) -> String {
        let known_as = self.connections.get(to).and_then(|entry| {
            match entry.active_call_peer.as_deref() {
                Some(peer) if peer == from => entry.active_call_ref.clone(),
                _ => None,
            }
        });
        known_as.unwrap_or_else(|| self.address_of(from))
    }

    /// All live connections except `connection_id`.
    pub fn other_connections(&self, connection_id: &str) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|entry| entry.key() != connection_id)
            .map(|entry| entry.key().clone())
            .collect()
    }

    // ── Call Links ────────────────────────────────────────────────────────

    /// Record that `connection_id` is in a call with `peer`, which it
    /// addresses as `reference`.
    pub fn link_call_peer(&self, connection_id: &str, peer: &str, reference: &str) {
        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            entry.active_call_peer = Some(peer.to_string());
            entry.active_call_ref = Some(reference.to_string());
        }
    }

    /// Clear the call link of `connection_id`, returning the old peer.
    pub fn unlink_call_peer(&self, connection_id: &str) -> Option<ConnectionId> {
        self.connections.get_mut(connection_id).and_then(|mut entry| {
            entry.active_call_ref = None;
            entry.active_call_peer.take()
        })
    }

    /// Clear the call link of `connection_id` only if it points at `peer`.
    pub fn unlink_call_peer_if(&self, connection_id: &str, peer: &str) {
        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            if entry.active_call_peer.as_deref() == Some(peer) {
                entry.active_call_peer = None;
                entry.active_call_ref = None;
            }
        }
    }

    /// The connection `connection_id` is linked to, if any.
    pub fn call_peer_of(&self, connection_id: &str) -> Option<ConnectionId> {
        self.connections
            .get(connection_id)
            .and_then(|entry| entry.active_call_peer.clone())
    }

    /// Connections whose call link points at `connection_id`.
    pub fn linked_to(&self, connection_id: &str) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|entry| entry.active_call_peer.as_deref() == Some(connection_id))
            .map(|entry| entry.key().clone())
            .collect()
    }

    // ── Stats ─────────────────────────────────────────────────────────────

    /// Get the number of live connections.
    pub fn online_count(&self) -> usize {
        self.connections.len()
    }

    /// Get the number of users reachable by user id.
    pub fn registered_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of answered calls: pairs of connections linked to each other.
    pub fn active_call_count(&self) -> usize {
        let links: Vec<(ConnectionId, ConnectionId)> = self
            .connections
            .iter()
            .filter_map(|entry| {
                entry
                    .active_call_peer
                    .clone()
                    .map(|peer| (entry.key().clone(), peer))
            })
            .collect();

        let mutual = links
            .iter()
            .filter(|(a, b)| links.iter().any(|(x, y)| x == b && y == a))
            .count();
        mutual / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RelayConfig {
        RelayConfig {
            port: 0,
            cors_origin: "*".to_string(),
            disconnect_notify: DisconnectNotify::Broadcast,
            require_user_id: false,
        }
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 5001);
        assert_eq!(config.cors_origin, "http://localhost:3000");
        assert_eq!(config.disconnect_notify, DisconnectNotify::Broadcast);
        assert!(!config.require_user_id);
    }

    #[test]
    fn test_add_and_remove_connection() {
        let state = RelayState::new(test_config());
        let (tx, _rx) = mpsc::unbounded_channel();

        let cid = state.add_connection(Some("u1"), tx);
        assert!(state.is_connected(&cid));
        assert_eq!(state.registry.lookup("u1"), Some(cid.clone()));
        assert_eq!(state.online_count(), 1);
        assert_eq!(state.registered_count(), 1);

        let entry = state.remove_connection(&cid).unwrap();
        assert_eq!(entry.user_id.as_deref(), Some("u1"));
        assert!(!state.is_connected(&cid));
        assert!(state.registry.lookup("u1").is_none());
    }

    #[test]
    fn test_anonymous_connection_is_not_registered() {
        let state = RelayState::new(test_config());
        let (tx, _rx) = mpsc::unbounded_channel();

        let cid = state.add_connection(None, tx);
        assert_eq!(state.registered_count(), 0);
        assert_eq!(state.address_of(&cid), cid);
        assert_eq!(state.resolve(&cid), Some(cid.clone()));
    }

    #[test]
    fn test_send_to_connection() {
        let state = RelayState::new(test_config());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cid = state.add_connection(None, tx);

        state.send_to_connection(&cid, ServerMessage::Pong).unwrap();
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Pong);
    }

    #[test]
    fn test_send_to_removed_connection_is_stale() {
        let state = RelayState::new(test_config());
        let (tx, _rx) = mpsc::unbounded_channel();
        let cid = state.add_connection(Some("u1"), tx);
        state.remove_connection(&cid);

        let err = state.send_to_connection(&cid, ServerMessage::Pong).unwrap_err();
        assert!(matches!(err, DeliveryError::NotPresent(_)));
    }

    #[test]
    fn test_send_to_closed_writer() {
        let state = RelayState::new(test_config());
        let (tx, rx) = mpsc::unbounded_channel();
        let cid = state.add_connection(None, tx);
        drop(rx);

        let err = state.send_to_connection(&cid, ServerMessage::Pong).unwrap_err();
        assert!(matches!(err, DeliveryError::Closed(_)));
    }

    #[test]
    fn test_resolve_user_or_connection() {
        let state = RelayState::new(test_config());
        let (tx, _rx) = mpsc::unbounded_channel();
        let cid = state.add_connection(Some("u1"), tx);

        assert_eq!(state.resolve("u1"), Some(cid.clone()));
        assert_eq!(state.resolve(&cid), Some(cid.clone()));
        assert!(state.resolve("ghost").is_none());
        assert_eq!(state.address_of(&cid), "u1");
    }

    #[test]
    fn test_call_links() {
        let state = RelayState::new(test_config());
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let a = state.add_connection(Some("u1"), tx1);
        let b = state.add_connection(Some("u2"), tx2);

        state.link_call_peer(&a, &b, "u2");
        assert_eq!(state.call_peer_of(&a), Some(b.clone()));
        assert_eq!(state.linked_to(&b), vec![a.clone()]);
        assert_eq!(state.active_call_count(), 0);

        state.link_call_peer(&b, &a, "u1");
        assert_eq!(state.active_call_count(), 1);
        state.unlink_call_peer(&b);

        state.unlink_call_peer_if(&a, "someone-else");
        assert_eq!(state.call_peer_of(&a), Some(b.clone()));

        assert_eq!(state.unlink_call_peer(&a), Some(b));
        assert!(state.call_peer_of(&a).is_none());
    }

    #[test]
    fn test_address_for_uses_recipients_reference() {
        let state = RelayState::new(test_config());
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let (tx3, _rx3) = mpsc::unbounded_channel();
        let a = state.add_connection(Some("u1"), tx1);
        let b = state.add_connection(Some("u2"), tx2);
        let c = state.add_connection(Some("u3"), tx3);

        // a called b by connection id.
        state.link_call_peer(&a, &b, &b);
        assert_eq!(state.address_for(&b, &a), b);
        // Anyone not in a call with b knows it by user id.
        assert_eq!(state.address_for(&b, &c), "u2");

        state.unlink_call_peer(&a);
        assert_eq!(state.address_for(&b, &a), "u2");
    }

    #[test]
    fn test_orphan_is_addressed_by_connection_id() {
        let state = RelayState::new(test_config());
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let old = state.add_connection(Some("u2"), tx1);
        let new = state.add_connection(Some("u2"), tx2);

        assert_eq!(state.address_of(&new), "u2");
        assert_eq!(state.address_of(&old), old);
    }

    #[test]
    fn test_other_connections() {
        let state = RelayState::new(test_config());
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let a = state.add_connection(None, tx1);
        let b = state.add_connection(None, tx2);

        assert_eq!(state.other_connections(&a), vec![b]);
    }
}
