//! Collaborator interfaces: room lookup and message persistence.
//!
//! The engine only calls these traits. The in-memory implementations back
//! the standalone server and the tests.

use crate::group::RoomId;
use crate::message::now_millis;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Room lookup errors.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The directory backend failed.
    #[error("Room directory unavailable: {0}")]
    Unavailable(String),
}

/// Message store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store backend failed.
    #[error("Message store unavailable: {0}")]
    Unavailable(String),
}

/// Resolves room names to room IDs.
#[async_trait]
pub trait RoomLookup: Send + Sync {
    /// Resolve a room name. `Ok(None)` means the room does not exist.
    async fn resolve(&self, name: &str) -> Result<Option<RoomId>, LookupError>;
}

/// A chat message handed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMessage {
    /// Sender username.
    pub user: String,
    /// Room the message was sent to.
    pub room: RoomId,
    /// Message text.
    pub content: String,
    /// When the message was accepted (milliseconds since epoch).
    pub timestamp: u64,
}

impl StoredMessage {
    /// Create a message stamped with the current time.
    #[must_use]
    pub fn new(user: impl Into<String>, room: RoomId, content: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            room,
            content: content.into(),
            timestamp: now_millis(),
        }
    }
}

/// Persists room chat messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message to the room's history.
    async fn append(&self, message: StoredMessage) -> Result<(), StoreError>;
}

/// Default number of chat messages waiting to be persisted.
pub const DEFAULT_PERSIST_QUEUE: usize = 1024;

/// Bounded hand-off of chat messages to a [`MessageStore`].
///
/// A single worker appends messages in the order they were submitted. When
/// the queue is full the message is dropped and logged; delivery to clients
/// never waits on the store.
#[derive(Debug, Clone)]
pub struct PersistQueue {
    tx: mpsc::Sender<StoredMessage>,
}

impl PersistQueue {
    /// Start the worker on the current tokio runtime.
    ///
    /// Outside a runtime the queue is created closed and every submission
    /// is dropped.
    #[must_use]
    pub fn spawn(store: Arc<dyn MessageStore>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<StoredMessage>(capacity.max(1));

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    while let Some(message) = rx.recv().await {
                        let room = message.room.clone();
                        if let Err(e) = store.append(message).await {
                            warn!(room = %room, error = %e, "Failed to persist message");
                        }
                    }
                    debug!("Persist queue closed");
                });
            }
            Err(_) => warn!("No tokio runtime, chat messages will not be persisted"),
        }

        Self { tx }
    }

    /// Queue a message for the store. Returns `false` if it was dropped.
    pub fn submit(&self, message: StoredMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!(room = %message.room, user = %message.user, "Persist queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                warn!(room = %message.room, user = %message.user, "Persist queue closed, dropping message");
                false
            }
        }
    }
}

/// A fixed set of known rooms.
#[derive(Debug, Clone, Default)]
pub struct StaticRoomDirectory {
    rooms: HashSet<String>,
}

impl StaticRoomDirectory {
    /// Create a directory from room names.
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rooms: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of known rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Check if the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[async_trait]
impl RoomLookup for StaticRoomDirectory {
    async fn resolve(&self, name: &str) -> Result<Option<RoomId>, LookupError> {
        Ok(self.rooms.contains(name).then(|| RoomId::new(name)))
    }
}

/// Default number of messages kept per room.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Keeps the most recent messages of each room in memory.
#[derive(Debug)]
pub struct InMemoryMessageStore {
    rooms: DashMap<RoomId, VecDeque<StoredMessage>>,
    limit: usize,
}

impl InMemoryMessageStore {
    /// Create a store keeping at most `limit` messages per room.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            limit: limit.max(1),
        }
    }

    /// Messages retained for a room, oldest first.
    #[must_use]
    pub fn recent(&self, room: &RoomId) -> Vec<StoredMessage> {
        self.rooms
            .get(room)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, message: StoredMessage) -> Result<(), StoreError> {
        trace!(room = %message.room, user = %message.user, "Storing message");
        let mut history = self.rooms.entry(message.room.clone()).or_default();
        if history.len() >= self.limit {
            history.pop_front();
        }
        history.push_back(message);
        Ok(())
    }
}
