//! Presence registry.
//!
//! Answers "which connection currently represents user X?". Entries are keyed
//! by user id and hold the connection id of the user's latest connection.
//! DashMap shards give single-writer-per-key semantics; nothing here spans a
//! lookup and a later send, so callers must treat a vanished target as a
//! delivery failure.

use std::sync::Arc;

use dashmap::DashMap;

/// Opaque per-connection identifier assigned by the relay on connect.
pub type ConnectionId = String;

/// Stable user identity supplied by the client at connect time.
pub type UserId = String;

/// User id → current connection id.
#[derive(Debug, Clone, Default)]
pub struct PresenceRegistry {
    users: Arc<DashMap<UserId, ConnectionId>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `user_id` to `connection_id`, replacing any previous mapping.
    ///
    /// Returns the replaced connection id when it differs from the new one.
    /// That connection is orphaned: it stays open but is no longer reachable
    /// by user id, and it is not notified.
    pub fn register(&self, user_id: &str, connection_id: &str) -> Option<ConnectionId> {
        let previous = self
            .users
            .insert(user_id.to_string(), connection_id.to_string())
            .filter(|prev| prev != connection_id);

        match &previous {
            Some(orphaned) => tracing::info!(
                user_id = user_id,
                connection_id = connection_id,
                orphaned = orphaned.as_str(),
                "User re-registered, previous connection orphaned"
            ),
            None => tracing::debug!(
                user_id = user_id,
                connection_id = connection_id,
                "User registered"
            ),
        }

        previous
    }

    /// Current connection for `user_id`, if any.
    pub fn lookup(&self, user_id: &str) -> Option<ConnectionId> {
        self.users.get(user_id).map(|entry| entry.value().clone())
    }

    /// Remove the entry pointing at `connection_id`.
    ///
    /// Disconnects only know the connection id, so this scans by value. The
    /// removal re-checks the value under the shard lock: if the user
    /// re-registered from a new connection in the meantime, the newer
    /// mapping is kept. No-op when nothing matches.
    pub fn unregister(&self, connection_id: &str) -> Option<UserId> {
        let user_id = self.user_for(connection_id)?;

        let removed = self
            .users
            .remove_if(&user_id, |_, current| current == connection_id)
            .map(|(user_id, _)| user_id);

        if let Some(ref user_id) = removed {
            tracing::debug!(
                user_id = user_id.as_str(),
                connection_id = connection_id,
                "User unregistered"
            );
        }

        removed
    }

    /// Reverse lookup: the user currently mapped to `connection_id`.
    pub fn user_for(&self, connection_id: &str) -> Option<UserId> {
        self.users
            .iter()
            .find(|entry| entry.value() == connection_id)
            .map(|entry| entry.key().clone())
    }

    /// Number of users with a live connection.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = PresenceRegistry::new();
        assert!(registry.register("u1", "c1").is_none());
        assert_eq!(registry.lookup("u1").as_deref(), Some("c1"));
        assert!(registry.lookup("u2").is_none());
    }

    #[test]
    fn test_last_writer_wins() {
        let registry = PresenceRegistry::new();
        registry.register("u1", "c1");
        let orphaned = registry.register("u1", "c2");

        assert_eq!(orphaned.as_deref(), Some("c1"));
        assert_eq!(registry.lookup("u1").as_deref(), Some("c2"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregister_same_connection_is_not_orphaning() {
        let registry = PresenceRegistry::new();
        registry.register("u1", "c1");
        assert!(registry.register("u1", "c1").is_none());
    }

    #[test]
    fn test_unregister_by_connection() {
        let registry = PresenceRegistry::new();
        registry.register("u1", "c1");
        registry.register("u2", "c2");

        assert_eq!(registry.unregister("c1").as_deref(), Some("u1"));
        assert!(registry.lookup("u1").is_none());
        assert_eq!(registry.lookup("u2").as_deref(), Some("c2"));
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let registry = PresenceRegistry::new();
        registry.register("u1", "c1");

        assert!(registry.unregister("c9").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_orphaned_disconnect_keeps_newer_mapping() {
        let registry = PresenceRegistry::new();
        registry.register("u1", "c1");
        registry.register("u1", "c2");

        // The orphaned connection closes after the user moved on.
        assert!(registry.unregister("c1").is_none());
        assert_eq!(registry.lookup("u1").as_deref(), Some("c2"));
    }

    #[test]
    fn test_user_for() {
        let registry = PresenceRegistry::new();
        registry.register("u1", "c1");
        assert_eq!(registry.user_for("c1").as_deref(), Some("u1"));
        assert!(registry.user_for("c2").is_none());
    }
}
