//! Group registry for Huddle.
//!
//! The registry is the single shared structure of the engine. It maps group
//! IDs to member sets (and, for room groups, their presence) and fans events
//! out to members.
//!
//! Each group lives in one entry of a sharded map. Every mutation of a group
//! and every broadcast to it runs under that entry's write lock, so all
//! events of a group reach each member in one total order and a broadcast
//! always sees a consistent member snapshot. Deliveries never block: they
//! push into bounded mailboxes, and a member whose mailbox is full or closed
//! is dropped from the group and evicted.

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::group::{Group, GroupId};
use crate::message::Envelope;
use crate::presence::{Presence, PresenceState};
use dashmap::DashMap;
use huddle_protocol::Event;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Outcome of a fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Members the event was queued for.
    pub recipients: usize,
    /// Members whose delivery failed and who were evicted.
    pub failed: usize,
}

/// Group entry with presence tracking.
struct GroupEntry {
    group: Group,
    presence: Presence,
}

impl GroupEntry {
    fn new(id: GroupId) -> Self {
        Self {
            group: Group::new(id),
            presence: Presence::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.group.is_empty() && self.presence.is_empty()
    }

    /// Deliver to every current member; callers hold the entry lock.
    fn deliver(&mut self, envelope: &Arc<Envelope>) -> Delivery {
        let mut delivery = Delivery::default();
        let mut failed = Vec::new();

        for member in self.group.members() {
            match member.deliver(Arc::clone(envelope)) {
                Ok(()) => delivery.recipients += 1,
                Err(e) => {
                    warn!(
                        group = %self.group.id(),
                        connection = %member.id(),
                        error = %e,
                        "Delivery failed, evicting member"
                    );
                    member.evict();
                    failed.push(member.id().clone());
                }
            }
        }

        for id in &failed {
            self.group.leave(id);
        }
        delivery.failed = failed.len();

        trace!(
            group = %self.group.id(),
            kind = %envelope.event.kind(),
            recipients = delivery.recipients,
            failed = delivery.failed,
            "Delivered event"
        );
        delivery
    }
}

fn encode(event: Event) -> Option<Arc<Envelope>> {
    match Envelope::new(event) {
        Ok(envelope) => Some(Arc::new(envelope)),
        Err(e) => {
            error!(error = %e, "Failed to encode event");
            None
        }
    }
}

/// The central group registry.
pub struct GroupRegistry {
    /// Groups indexed by ID.
    groups: DashMap<GroupId, GroupEntry>,
}

impl GroupRegistry {
    /// Create a new registry.
    #[must_use]
    pub fn new() -> Self {
        info!("Creating group registry");
        Self {
            groups: DashMap::new(),
        }
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for entry in self.groups.iter() {
            stats.group_count += 1;
            stats.member_count += entry.group.member_count();
            stats.online_count += entry.presence.count();
        }
        stats
    }

    /// Add a connection to a group, creating the group if needed.
    ///
    /// Returns `true` if the connection was not already a member.
    pub fn join(&self, group_id: &GroupId, handle: &ConnectionHandle) -> bool {
        let mut entry = self.groups.entry(group_id.clone()).or_insert_with(|| {
            debug!(group = %group_id, "Creating new group");
            GroupEntry::new(group_id.clone())
        });
        entry.group.join(handle.clone())
    }

    /// Remove a connection from a group. A no-op for non-members.
    ///
    /// Returns `true` if the connection was a member.
    pub fn leave(&self, group_id: &GroupId, connection_id: &ConnectionId) -> bool {
        let removed = match self.groups.get_mut(group_id) {
            Some(mut entry) => entry.group.leave(connection_id),
            None => false,
        };
        self.collect(group_id);
        removed
    }

    /// Broadcast an event to every current member of a group.
    ///
    /// Never fails: delivery errors are isolated per member.
    pub fn broadcast(&self, group_id: &GroupId, event: Event) -> Delivery {
        let Some(mut entry) = self.groups.get_mut(group_id) else {
            debug!(group = %group_id, kind = %event.kind(), "Broadcast to empty group");
            return Delivery::default();
        };
        let Some(envelope) = encode(event) else {
            return Delivery::default();
        };
        let delivery = entry.deliver(&envelope);
        drop(entry);

        if delivery.failed > 0 {
            self.collect(group_id);
        }
        delivery
    }

    /// Send an event to a single connection.
    ///
    /// A failed send evicts the connection. Returns `true` if queued.
    pub fn send_to(&self, handle: &ConnectionHandle, event: Event) -> bool {
        let Some(envelope) = encode(event) else {
            return false;
        };
        match handle.deliver(envelope) {
            Ok(()) => true,
            Err(e) => {
                warn!(connection = %handle.id(), error = %e, "Direct send failed, evicting connection");
                handle.evict();
                false
            }
        }
    }

    /// Mark `username` online in a room group on behalf of `connection_id`.
    ///
    /// If this brings the user online, a `user_join` event is broadcast to
    /// the group under the same lock. Returns `true` in that case.
    pub fn mark_online(
        &self,
        group_id: &GroupId,
        connection_id: &ConnectionId,
        username: &str,
    ) -> bool {
        let mut entry = self
            .groups
            .entry(group_id.clone())
            .or_insert_with(|| GroupEntry::new(group_id.clone()));
        if !entry.presence.join(username, connection_id) {
            return false;
        }
        if let Some(envelope) = encode(Event::user_join(username)) {
            entry.deliver(&envelope);
        }
        true
    }

    /// Release `connection_id`'s presence for `username` in a room group.
    ///
    /// If this takes the user offline, a `user_leave` event is broadcast to
    /// the group under the same lock. Returns `true` in that case.
    pub fn mark_offline(
        &self,
        group_id: &GroupId,
        connection_id: &ConnectionId,
        username: &str,
    ) -> bool {
        let went_offline = match self.groups.get_mut(group_id) {
            Some(mut entry) => {
                let went_offline = entry.presence.leave(username, connection_id);
                if went_offline {
                    if let Some(envelope) = encode(Event::user_leave(username)) {
                        entry.deliver(&envelope);
                    }
                }
                went_offline
            }
            None => false,
        };
        self.collect(group_id);
        went_offline
    }

    /// Online usernames of a room group, in ascending order.
    #[must_use]
    pub fn list_online(&self, group_id: &GroupId) -> Vec<String> {
        self.groups
            .get(group_id)
            .map(|e| e.presence.usernames())
            .unwrap_or_default()
    }

    /// Get the presence snapshot of a room group.
    #[must_use]
    pub fn presence_snapshot(&self, group_id: &GroupId) -> Vec<PresenceState> {
        self.groups
            .get(group_id)
            .map(|e| e.presence.snapshot())
            .unwrap_or_default()
    }

    /// Check if a group exists.
    #[must_use]
    pub fn group_exists(&self, group_id: &GroupId) -> bool {
        self.groups.contains_key(group_id)
    }

    /// Check if a connection is a member of a group.
    #[must_use]
    pub fn is_member(&self, group_id: &GroupId, connection_id: &ConnectionId) -> bool {
        self.groups
            .get(group_id)
            .map(|e| e.group.is_member(connection_id))
            .unwrap_or(false)
    }

    /// Get the member count of a group.
    #[must_use]
    pub fn member_count(&self, group_id: &GroupId) -> usize {
        self.groups
            .get(group_id)
            .map(|e| e.group.member_count())
            .unwrap_or(0)
    }

    /// Get all group IDs.
    #[must_use]
    pub fn group_ids(&self) -> Vec<GroupId> {
        self.groups.iter().map(|e| e.key().clone()).collect()
    }

    /// Remove a group once it has no members and no presence.
    fn collect(&self, group_id: &GroupId) {
        if self
            .groups
            .remove_if(group_id, |_, entry| entry.is_empty())
            .is_some()
        {
            debug!(group = %group_id, "Deleted empty group");
        }
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Number of live groups.
    pub group_count: usize,
    /// Total memberships across groups.
    pub member_count: usize,
    /// Total online users across rooms.
    pub online_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{mailbox, Mailbox};
    use crate::group::RoomId;

    fn conn(id: &str) -> (ConnectionHandle, Mailbox) {
        mailbox(ConnectionId::from(id), 16)
    }

    fn drain(mailbox: &mut Mailbox) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(envelope) = mailbox.try_recv() {
            events.push(envelope.event.clone());
        }
        events
    }

    fn general() -> GroupId {
        GroupId::room(&RoomId::new("general"))
    }

    #[test]
    fn test_registry_join_leave() {
        let registry = GroupRegistry::new();
        let (h1, _m1) = conn("conn-1");

        assert!(registry.join(&general(), &h1));
        assert!(!registry.join(&general(), &h1));
        assert!(registry.group_exists(&general()));
        assert_eq!(registry.member_count(&general()), 1);

        assert!(registry.leave(&general(), h1.id()));
        assert!(!registry.leave(&general(), h1.id()));
        // Group should be auto-deleted
        assert!(!registry.group_exists(&general()));
    }

    #[test]
    fn test_registry_join_leave_replay() {
        let registry = GroupRegistry::new();
        let (h1, _m1) = conn("conn-1");
        let (h2, _m2) = conn("conn-2");
        let (h3, _m3) = conn("conn-3");

        registry.join(&general(), &h1);
        registry.join(&general(), &h2);
        registry.join(&general(), &h1);
        registry.leave(&general(), h2.id());
        registry.leave(&general(), h3.id());
        registry.join(&general(), &h3);
        registry.leave(&general(), h1.id());
        registry.join(&general(), &h2);

        assert!(!registry.is_member(&general(), h1.id()));
        assert!(registry.is_member(&general(), h2.id()));
        assert!(registry.is_member(&general(), h3.id()));
        assert_eq!(registry.member_count(&general()), 2);
    }

    #[test]
    fn test_registry_broadcast() {
        let registry = GroupRegistry::new();
        let (h1, mut m1) = conn("conn-1");
        let (h2, mut m2) = conn("conn-2");
        let (h3, mut m3) = conn("conn-3");

        registry.join(&general(), &h1);
        registry.join(&general(), &h2);

        let delivery = registry.broadcast(&general(), Event::chat_message("alice", "before"));
        assert_eq!(delivery, Delivery { recipients: 2, failed: 0 });

        registry.join(&general(), &h3);
        registry.leave(&general(), h1.id());
        registry.broadcast(&general(), Event::chat_message("alice", "after"));

        assert_eq!(drain(&mut m1), vec![Event::chat_message("alice", "before")]);
        assert_eq!(
            drain(&mut m2),
            vec![
                Event::chat_message("alice", "before"),
                Event::chat_message("alice", "after")
            ]
        );
        assert_eq!(drain(&mut m3), vec![Event::chat_message("alice", "after")]);
    }

    #[test]
    fn test_registry_broadcast_missing_group() {
        let registry = GroupRegistry::new();
        let delivery = registry.broadcast(&GroupId::inbox("nobody"), Event::user_join("x"));
        assert_eq!(delivery, Delivery::default());
        assert!(!registry.group_exists(&GroupId::inbox("nobody")));
    }

    #[test]
    fn test_registry_evicts_failed_member() {
        let registry = GroupRegistry::new();
        let (slow, mut slow_mailbox) = mailbox(ConnectionId::from("slow"), 1);
        let (h2, mut m2) = conn("conn-2");

        registry.join(&general(), &slow);
        registry.join(&general(), &h2);

        registry.broadcast(&general(), Event::chat_message("alice", "one"));
        let delivery = registry.broadcast(&general(), Event::chat_message("alice", "two"));
        assert_eq!(delivery, Delivery { recipients: 1, failed: 1 });

        assert!(slow.is_evicted());
        assert!(!registry.is_member(&general(), slow.id()));
        assert_eq!(drain(&mut m2).len(), 2);
        assert_eq!(drain(&mut slow_mailbox).len(), 1);
    }

    #[test]
    fn test_registry_closed_member_isolated() {
        let registry = GroupRegistry::new();
        let (gone, gone_mailbox) = conn("gone");
        let (h2, mut m2) = conn("conn-2");
        drop(gone_mailbox);

        registry.join(&general(), &gone);
        registry.join(&general(), &h2);

        let delivery = registry.broadcast(&general(), Event::user_join("bob"));
        assert_eq!(delivery.recipients, 1);
        assert_eq!(drain(&mut m2), vec![Event::user_join("bob")]);
    }

    #[test]
    fn test_registry_presence_announcements() {
        let registry = GroupRegistry::new();
        let (h1, mut m1) = conn("conn-1");
        let (h2, mut m2) = conn("conn-2");
        registry.join(&general(), &h1);
        registry.join(&general(), &h2);

        assert!(registry.mark_online(&general(), h1.id(), "alice"));
        assert!(!registry.mark_online(&general(), h2.id(), "alice"));
        assert_eq!(registry.list_online(&general()), vec!["alice"]);

        assert!(!registry.mark_offline(&general(), h1.id(), "alice"));
        assert_eq!(registry.list_online(&general()), vec!["alice"]);
        assert!(registry.mark_offline(&general(), h2.id(), "alice"));
        assert!(registry.list_online(&general()).is_empty());

        let expected = vec![Event::user_join("alice"), Event::user_leave("alice")];
        assert_eq!(drain(&mut m1), expected);
        assert_eq!(drain(&mut m2), expected);
    }

    #[test]
    fn test_registry_presence_snapshot() {
        let registry = GroupRegistry::new();
        let (h1, _m1) = conn("conn-1");
        let (h2, _m2) = conn("conn-2");
        registry.mark_online(&general(), h1.id(), "bob");
        registry.mark_online(&general(), h2.id(), "alice");
        registry.mark_online(&general(), h1.id(), "alice");

        let snapshot = registry.presence_snapshot(&general());
        let summary: Vec<_> = snapshot
            .iter()
            .map(|p| (p.username.as_str(), p.connection_count()))
            .collect();
        assert_eq!(summary, vec![("alice", 2), ("bob", 1)]);
        assert!(registry
            .presence_snapshot(&GroupId::room(&RoomId::new("empty")))
            .is_empty());
    }

    #[test]
    fn test_registry_presence_keeps_group_alive() {
        let registry = GroupRegistry::new();
        let (h1, _m1) = conn("conn-1");

        registry.join(&general(), &h1);
        registry.mark_online(&general(), h1.id(), "alice");
        registry.leave(&general(), h1.id());
        assert!(registry.group_exists(&general()));

        registry.mark_offline(&general(), h1.id(), "alice");
        assert!(!registry.group_exists(&general()));
    }

    #[test]
    fn test_registry_send_to() {
        let registry = GroupRegistry::new();
        let (h1, mut m1) = conn("conn-1");

        assert!(registry.send_to(&h1, Event::user_list(vec![])));
        assert_eq!(drain(&mut m1), vec![Event::user_list(vec![])]);
    }

    #[test]
    fn test_registry_stats() {
        let registry = GroupRegistry::new();
        let (h1, _m1) = conn("conn-1");
        let (h2, _m2) = conn("conn-2");

        registry.join(&general(), &h1);
        registry.join(&general(), &h2);
        registry.join(&GroupId::inbox("alice"), &h1);
        registry.mark_online(&general(), h1.id(), "alice");

        let stats = registry.stats();
        assert_eq!(stats.group_count, 2);
        assert_eq!(stats.member_count, 3);
        assert_eq!(stats.online_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_registry_concurrent_join_leave() {
        let registry = Arc::new(GroupRegistry::new());
        let mut tasks = Vec::new();

        for i in 0..32 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let (handle, _mailbox) = conn(&format!("conn-{}", i));
                for _ in 0..50 {
                    registry.join(&general(), &handle);
                    registry.broadcast(&general(), Event::chat_message("x", "y"));
                    registry.leave(&general(), handle.id());
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(!registry.group_exists(&general()));
        assert_eq!(registry.stats().member_count, 0);
    }
}
