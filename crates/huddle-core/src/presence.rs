//! Presence tracking for Huddle.
//!
//! Presence is the set of authenticated usernames online in a room. It is
//! reference counted by connection: a user stays online while at least one
//! of their connections is joined, so a second tab closing does not mark the
//! user offline.

use crate::connection::ConnectionId;
use crate::message::now_millis;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Presence state for a single user.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceState {
    /// The username.
    pub username: String,
    /// Connections currently holding this user online. Serialized as a
    /// count.
    #[serde(serialize_with = "serialize_count")]
    pub connections: HashSet<ConnectionId>,
    /// When the user came online (milliseconds since epoch).
    pub online_since: u64,
}

fn serialize_count<S: Serializer>(
    connections: &HashSet<ConnectionId>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(connections.len() as u64)
}

impl PresenceState {
    fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            connections: HashSet::new(),
            online_since: now_millis(),
        }
    }

    /// Number of live connections for this user.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

/// Presence tracker for one room.
#[derive(Debug, Default)]
pub struct Presence {
    /// Online users, ordered by username.
    members: BTreeMap<String, PresenceState>,
}

impl Presence {
    /// Create a new presence tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of online users.
    #[must_use]
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Check if a user is online.
    #[must_use]
    pub fn is_online(&self, username: &str) -> bool {
        self.members.contains_key(username)
    }

    /// Get the presence state for a user.
    #[must_use]
    pub fn get(&self, username: &str) -> Option<&PresenceState> {
        self.members.get(username)
    }

    /// Record that `connection` holds `username` online.
    ///
    /// Idempotent per connection. Returns `true` only if the user was
    /// offline before this call.
    pub fn join(&mut self, username: &str, connection: &ConnectionId) -> bool {
        let is_new = !self.members.contains_key(username);
        let state = self
            .members
            .entry(username.to_string())
            .or_insert_with(|| PresenceState::new(username));
        state.connections.insert(connection.clone());

        if is_new {
            debug!(user = %username, connection = %connection, "Presence: user online");
        }

        is_new
    }

    /// Release `connection`'s hold on `username`.
    ///
    /// A no-op for unknown users or connections. Returns `true` only if this
    /// released the user's last connection.
    pub fn leave(&mut self, username: &str, connection: &ConnectionId) -> bool {
        let Some(state) = self.members.get_mut(username) else {
            return false;
        };
        if !state.connections.remove(connection) || !state.connections.is_empty() {
            return false;
        }

        self.members.remove(username);
        debug!(user = %username, connection = %connection, "Presence: user offline");
        true
    }

    /// Online usernames in ascending order.
    #[must_use]
    pub fn usernames(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    /// Get full presence state as a serializable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PresenceState> {
        self.members.values().cloned().collect()
    }

    /// Check if presence is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_join_leave() {
        let mut presence = Presence::new();
        let c1 = ConnectionId::from("conn-1");

        assert!(presence.join("alice", &c1));
        assert!(!presence.join("alice", &c1));

        assert_eq!(presence.count(), 1);
        assert!(presence.is_online("alice"));

        assert!(presence.leave("alice", &c1));
        assert!(!presence.is_online("alice"));
        assert!(!presence.leave("alice", &c1));
    }

    #[test]
    fn test_presence_reference_counted() {
        let mut presence = Presence::new();
        let c1 = ConnectionId::from("conn-1");
        let c2 = ConnectionId::from("conn-2");

        assert!(presence.join("alice", &c1));
        assert!(!presence.join("alice", &c2));
        assert_eq!(presence.get("alice").unwrap().connection_count(), 2);

        assert!(!presence.leave("alice", &c1));
        assert!(presence.is_online("alice"));

        assert!(presence.leave("alice", &c2));
        assert!(presence.is_empty());
    }

    #[test]
    fn test_presence_leave_unknown_connection() {
        let mut presence = Presence::new();
        presence.join("alice", &ConnectionId::from("conn-1"));

        assert!(!presence.leave("alice", &ConnectionId::from("conn-9")));
        assert!(!presence.leave("bob", &ConnectionId::from("conn-1")));
        assert!(presence.is_online("alice"));
    }

    #[test]
    fn test_presence_snapshot_sorted() {
        let mut presence = Presence::new();
        presence.join("carol", &ConnectionId::from("conn-3"));
        presence.join("alice", &ConnectionId::from("conn-1"));
        presence.join("bob", &ConnectionId::from("conn-2"));

        assert_eq!(presence.usernames(), vec!["alice", "bob", "carol"]);
        assert_eq!(presence.snapshot().len(), 3);
    }

    #[test]
    fn test_presence_snapshot_serializes_connection_count() {
        let mut presence = Presence::new();
        presence.join("alice", &ConnectionId::from("conn-1"));
        presence.join("alice", &ConnectionId::from("conn-2"));

        let value = serde_json::to_value(presence.snapshot()).unwrap();
        assert_eq!(value[0]["username"], "alice");
        assert_eq!(value[0]["connections"], 2);
        assert!(value[0]["online_since"].as_u64().unwrap() > 0);
    }
}
