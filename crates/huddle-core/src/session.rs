//! Per-connection room sessions.
//!
//! A [`RoomSession`] owns the lifecycle of one connection in one room:
//! `Connecting -> Joined -> Closed`. It registers the connection with the
//! room group, the user's inbox and presence on connect, executes routed
//! messages while joined, and undoes every registration exactly once on
//! disconnect.

use crate::connection::{ConnectionHandle, ConnectionId, Identity};
use crate::group::{GroupId, RoomId};
use crate::registry::{Delivery, GroupRegistry};
use crate::router::{route, RouteError, RouterAction};
use crate::store::{
    LookupError, MessageStore, PersistQueue, RoomLookup, StoredMessage, DEFAULT_PERSIST_QUEUE,
};
use huddle_protocol::Event;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Session errors. Only raised while connecting.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No room with this name.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// The room lookup failed.
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Joined,
    Closed,
}

/// Result of handling one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A chat message went to the room.
    Broadcast(Delivery),
    /// A private message went to the target's inbox.
    PrivateMessage(Delivery),
    /// The session is no longer joined; the frame was ignored.
    Ignored,
}

/// Shared services a session needs.
#[derive(Clone)]
pub struct Hub {
    /// The process-wide group registry.
    pub registry: Arc<GroupRegistry>,
    /// Ordered, bounded queue into the message store.
    pub persist: PersistQueue,
}

impl Hub {
    /// Create a hub with the default persistence queue.
    ///
    /// Must be called inside a tokio runtime for messages to be stored.
    #[must_use]
    pub fn new(registry: Arc<GroupRegistry>, store: Arc<dyn MessageStore>) -> Self {
        Self::with_persist_capacity(registry, store, DEFAULT_PERSIST_QUEUE)
    }

    /// Create a hub whose persistence queue holds `capacity` messages.
    #[must_use]
    pub fn with_persist_capacity(
        registry: Arc<GroupRegistry>,
        store: Arc<dyn MessageStore>,
        capacity: usize,
    ) -> Self {
        Self {
            registry,
            persist: PersistQueue::spawn(store, capacity),
        }
    }
}

/// The state machine of one connection in one room.
pub struct RoomSession {
    hub: Hub,
    room: RoomId,
    room_group: GroupId,
    inbox_group: Option<GroupId>,
    identity: Identity,
    handle: ConnectionHandle,
    state: SessionState,
}

impl RoomSession {
    /// Resolve `room_name` and join it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RoomNotFound`] if the room does not exist, in
    /// which case the connection joins nothing.
    pub async fn connect(
        hub: Hub,
        lookup: &dyn RoomLookup,
        room_name: &str,
        identity: Identity,
        handle: ConnectionHandle,
    ) -> Result<Self, SessionError> {
        let room = lookup
            .resolve(room_name)
            .await?
            .ok_or_else(|| SessionError::RoomNotFound(room_name.to_string()))?;
        Ok(Self::join(hub, room, identity, handle))
    }

    /// Join an already resolved room.
    #[must_use]
    pub fn join(hub: Hub, room: RoomId, identity: Identity, handle: ConnectionHandle) -> Self {
        let room_group = GroupId::room(&room);
        let inbox_group = identity.username().map(GroupId::inbox);
        let mut session = Self {
            hub,
            room,
            room_group,
            inbox_group,
            identity,
            handle,
            state: SessionState::Connecting,
        };
        session.enter();
        session
    }

    fn enter(&mut self) {
        let registry = &self.hub.registry;

        registry.join(&self.room_group, &self.handle);

        // Snapshot after joining the group: anyone who comes online later
        // is announced to us instead.
        let users = registry.list_online(&self.room_group);
        registry.send_to(&self.handle, Event::user_list(users));

        if let (Some(username), Some(inbox)) = (self.identity.username(), &self.inbox_group) {
            registry.join(inbox, &self.handle);
            registry.mark_online(&self.room_group, self.handle.id(), username);
        }

        self.state = SessionState::Joined;
        info!(
            room = %self.room,
            connection = %self.handle.id(),
            user = self.identity.username().unwrap_or("<anonymous>"),
            "Session joined"
        );
    }

    /// Get the session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get the room.
    #[must_use]
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Get the connection's identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Get the connection ID.
    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        self.handle.id()
    }

    /// Route and execute one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns the routing error for malformed or unauthorized frames. The
    /// frame is dropped without a reply and the session stays joined.
    pub fn handle_frame(&self, payload: &str) -> Result<FrameOutcome, RouteError> {
        if self.state != SessionState::Joined {
            return Ok(FrameOutcome::Ignored);
        }

        let action = route(&self.identity, payload).map_err(|e| {
            debug!(connection = %self.handle.id(), error = %e, "Dropping inbound frame");
            e
        })?;
        let user = self.identity.username().ok_or(RouteError::Unauthorized)?;
        let registry = &self.hub.registry;

        match action {
            RouterAction::Broadcast { text } => {
                let delivery =
                    registry.broadcast(&self.room_group, Event::chat_message(user, text.clone()));
                self.persist(user, text);
                Ok(FrameOutcome::Broadcast(delivery))
            }
            RouterAction::PrivateMessage { target, text } => {
                let delivery = registry.broadcast(
                    &GroupId::inbox(&target),
                    Event::private_message(user, text.clone()),
                );
                registry.send_to(
                    &self.handle,
                    Event::private_message_delivered(target, text),
                );
                Ok(FrameOutcome::PrivateMessage(delivery))
            }
        }
    }

    /// Hand a delivered chat message to the store without waiting on it.
    fn persist(&self, user: &str, text: String) {
        self.hub
            .persist
            .submit(StoredMessage::new(user, self.room.clone(), text));
    }

    /// Leave every group and release presence.
    ///
    /// Idempotent: returns `true` only for the call that closed the session.
    pub fn disconnect(&mut self) -> bool {
        if self.state != SessionState::Joined {
            return false;
        }
        self.state = SessionState::Closed;

        let registry = &self.hub.registry;
        registry.leave(&self.room_group, self.handle.id());

        if let (Some(username), Some(inbox)) = (self.identity.username(), &self.inbox_group) {
            registry.leave(inbox, self.handle.id());
            registry.mark_offline(&self.room_group, self.handle.id(), username);
        }

        info!(room = %self.room, connection = %self.handle.id(), "Session closed");
        true
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}
