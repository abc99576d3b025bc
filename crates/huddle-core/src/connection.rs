//! Connection handles and mailboxes.
//!
//! A live connection is represented inside the engine by a cheap, cloneable
//! [`ConnectionHandle`]. Groups hold handles, never the transport itself.
//! Every handle feeds one bounded [`Mailbox`] that the transport driver
//! drains in order, which gives per-connection FIFO delivery.

use crate::message::Envelope;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a connection ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let counter = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Authentication context of a connection, resolved before it reaches a
/// session and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    username: Option<String>,
}

impl Identity {
    /// An unauthenticated connection.
    #[must_use]
    pub fn anonymous() -> Self {
        Self { username: None }
    }

    /// A connection carrying a verified username.
    #[must_use]
    pub fn authenticated(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
        }
    }

    /// Build from an optional username; empty names are anonymous.
    #[must_use]
    pub fn from_username(username: Option<String>) -> Self {
        Self {
            username: username.filter(|u| !u.is_empty()),
        }
    }

    /// The verified username, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Whether the connection is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }
}

/// Delivery failure into a connection's mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The connection is closed or has been evicted.
    #[error("Connection closed")]
    Closed,

    /// The mailbox is full; the consumer is too slow.
    #[error("Mailbox full")]
    Full,
}

#[derive(Debug, Default)]
struct Shared {
    evicted: AtomicBool,
    wake: Notify,
}

/// Sending side of a connection, held by groups and sessions.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<Arc<Envelope>>,
    shared: Arc<Shared>,
}

/// Receiving side of a connection, drained by the transport driver.
#[derive(Debug)]
pub struct Mailbox {
    id: ConnectionId,
    receiver: mpsc::Receiver<Arc<Envelope>>,
    shared: Arc<Shared>,
}

/// Create a handle/mailbox pair with a bounded queue of `capacity` envelopes.
#[must_use]
pub fn mailbox(id: ConnectionId, capacity: usize) -> (ConnectionHandle, Mailbox) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let shared = Arc::new(Shared::default());
    (
        ConnectionHandle {
            id: id.clone(),
            sender,
            shared: Arc::clone(&shared),
        },
        Mailbox {
            id,
            receiver,
            shared,
        },
    )
}

impl ConnectionHandle {
    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue an envelope for delivery without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Full`] if the mailbox is at capacity and
    /// [`SendError::Closed`] if the mailbox is gone or the connection was
    /// evicted.
    pub fn deliver(&self, envelope: Arc<Envelope>) -> Result<(), SendError> {
        if self.is_evicted() {
            return Err(SendError::Closed);
        }
        self.sender.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Mark the connection for disconnection and wake its mailbox.
    ///
    /// Returns `true` the first time it is called.
    pub fn evict(&self) -> bool {
        if self.shared.evicted.swap(true, Ordering::SeqCst) {
            return false;
        }
        debug!(connection = %self.id, "Connection evicted");
        self.shared.wake.notify_one();
        true
    }

    /// Check if the connection has been evicted.
    #[must_use]
    pub fn is_evicted(&self) -> bool {
        self.shared.evicted.load(Ordering::SeqCst)
    }
}

impl Mailbox {
    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Wait for the next envelope.
    ///
    /// Returns `None` once the connection is evicted or every handle has
    /// been dropped.
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        if self.shared.evicted.load(Ordering::SeqCst) {
            return None;
        }
        tokio::select! {
            biased;
            () = self.shared.wake.notified() => None,
            envelope = self.receiver.recv() => envelope,
        }
    }

    /// Take the next queued envelope, if any.
    pub fn try_recv(&mut self) -> Option<Arc<Envelope>> {
        self.receiver.try_recv().ok()
    }

    /// Check if the connection has been evicted.
    #[must_use]
    pub fn is_evicted(&self) -> bool {
        self.shared.evicted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_protocol::Event;

    fn envelope(text: &str) -> Arc<Envelope> {
        Arc::new(Envelope::new(Event::chat_message("alice", text)).unwrap())
    }

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_identity() {
        assert!(!Identity::anonymous().is_authenticated());
        assert_eq!(Identity::authenticated("alice").username(), Some("alice"));
        assert!(!Identity::from_username(Some(String::new())).is_authenticated());
    }

    #[tokio::test]
    async fn test_mailbox_fifo() {
        let (handle, mut mailbox) = mailbox("conn-1".into(), 8);
        handle.deliver(envelope("one")).unwrap();
        handle.deliver(envelope("two")).unwrap();

        let first = mailbox.recv().await.unwrap();
        let second = mailbox.recv().await.unwrap();
        assert_eq!(first.event, Event::chat_message("alice", "one"));
        assert_eq!(second.event, Event::chat_message("alice", "two"));
    }

    #[test]
    fn test_mailbox_full_and_closed() {
        let (handle, mailbox) = mailbox("conn-1".into(), 1);
        handle.deliver(envelope("one")).unwrap();
        assert_eq!(handle.deliver(envelope("two")), Err(SendError::Full));

        drop(mailbox);
        assert_eq!(handle.deliver(envelope("three")), Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_evict_wakes_mailbox() {
        let (handle, mut mailbox) = mailbox("conn-1".into(), 8);

        let waiter = tokio::spawn(async move { mailbox.recv().await.is_none() });
        tokio::task::yield_now().await;

        assert!(handle.evict());
        assert!(!handle.evict());
        assert!(waiter.await.unwrap());
        assert_eq!(handle.deliver(envelope("late")), Err(SendError::Closed));
    }
}
