//! Group abstraction for Huddle.
//!
//! A group is a named set of connections that receive the same events: a
//! room's broadcast group (`chat_<room>`) or a user's inbox (`inbox_<user>`).

use crate::connection::{ConnectionHandle, ConnectionId};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Prefix of room broadcast groups.
pub const ROOM_GROUP_PREFIX: &str = "chat_";

/// Prefix of per-user inbox groups.
pub const INBOX_GROUP_PREFIX: &str = "inbox_";

/// An opaque room identifier, produced by a room lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Create a room ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A group identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(String);

impl GroupId {
    /// The broadcast group of a room.
    #[must_use]
    pub fn room(room: &RoomId) -> Self {
        Self(format!("{}{}", ROOM_GROUP_PREFIX, room.as_str()))
    }

    /// The private inbox group of a user.
    #[must_use]
    pub fn inbox(username: &str) -> Self {
        Self(format!("{}{}", INBOX_GROUP_PREFIX, username))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The member set of one group.
#[derive(Debug)]
pub struct Group {
    id: GroupId,
    members: HashMap<ConnectionId, ConnectionHandle>,
}

impl Group {
    /// Create an empty group.
    #[must_use]
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            members: HashMap::new(),
        }
    }

    /// Get the group ID.
    #[must_use]
    pub fn id(&self) -> &GroupId {
        &self.id
    }

    /// Get the number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Check if a connection is a member.
    #[must_use]
    pub fn is_member(&self, connection_id: &ConnectionId) -> bool {
        self.members.contains_key(connection_id)
    }

    /// Add a connection.
    ///
    /// Returns `true` if the connection was not already a member.
    pub fn join(&mut self, handle: ConnectionHandle) -> bool {
        if self.members.contains_key(handle.id()) {
            return false;
        }
        debug!(group = %self.id, connection = %handle.id(), "Connection joined group");
        self.members.insert(handle.id().clone(), handle);
        true
    }

    /// Remove a connection.
    ///
    /// Returns `true` if the connection was a member.
    pub fn leave(&mut self, connection_id: &ConnectionId) -> bool {
        let removed = self.members.remove(connection_id).is_some();
        if removed {
            debug!(group = %self.id, connection = %connection_id, "Connection left group");
        }
        removed
    }

    /// Iterate over current members.
    pub fn members(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.members.values()
    }

    /// Check if the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
