//! Event types for the Huddle protocol.
//!
//! Every outbound frame is one [`Event`], serialized as a JSON object with a
//! `type` tag. Inbound frames carry a single `message` string.

use serde::{Deserialize, Serialize};

/// Event kind identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    UserList,
    UserJoin,
    UserLeave,
    ChatMessage,
    PrivateMessage,
    PrivateMessageDelivered,
}

impl EventKind {
    /// The wire name of this kind (the value of the `type` field).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::UserList => "user_list",
            EventKind::UserJoin => "user_join",
            EventKind::UserLeave => "user_leave",
            EventKind::ChatMessage => "chat_message",
            EventKind::PrivateMessage => "private_message",
            EventKind::PrivateMessageDelivered => "private_message_delivered",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound event.
///
/// Events are immutable once built; the registry encodes each one once and
/// shares the encoded text across all recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Presence snapshot, sent only to a connection that just joined.
    UserList {
        /// Usernames currently online in the room.
        users: Vec<String>,
    },

    /// A user came online in the room.
    UserJoin {
        /// The username.
        user: String,
    },

    /// A user went offline in the room.
    UserLeave {
        /// The username.
        user: String,
    },

    /// A message broadcast to the whole room.
    ChatMessage {
        /// Sender username.
        user: String,
        /// Message text.
        message: String,
    },

    /// A private message delivered to the target's inbox.
    PrivateMessage {
        /// Sender username.
        user: String,
        /// Message text.
        message: String,
    },

    /// Acknowledgment to the sender that a private message was submitted.
    ///
    /// This does not confirm that the target was online.
    PrivateMessageDelivered {
        /// Target username.
        target: String,
        /// Message text.
        message: String,
    },
}

impl Event {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Event::UserList { .. } => EventKind::UserList,
            Event::UserJoin { .. } => EventKind::UserJoin,
            Event::UserLeave { .. } => EventKind::UserLeave,
            Event::ChatMessage { .. } => EventKind::ChatMessage,
            Event::PrivateMessage { .. } => EventKind::PrivateMessage,
            Event::PrivateMessageDelivered { .. } => EventKind::PrivateMessageDelivered,
        }
    }

    /// Create a new UserList event.
    #[must_use]
    pub fn user_list(users: Vec<String>) -> Self {
        Event::UserList { users }
    }

    /// Create a new UserJoin event.
    #[must_use]
    pub fn user_join(user: impl Into<String>) -> Self {
        Event::UserJoin { user: user.into() }
    }

    /// Create a new UserLeave event.
    #[must_use]
    pub fn user_leave(user: impl Into<String>) -> Self {
        Event::UserLeave { user: user.into() }
    }

    /// Create a new ChatMessage event.
    #[must_use]
    pub fn chat_message(user: impl Into<String>, message: impl Into<String>) -> Self {
        Event::ChatMessage {
            user: user.into(),
            message: message.into(),
        }
    }

    /// Create a new PrivateMessage event.
    #[must_use]
    pub fn private_message(user: impl Into<String>, message: impl Into<String>) -> Self {
        Event::PrivateMessage {
            user: user.into(),
            message: message.into(),
        }
    }

    /// Create a new PrivateMessageDelivered event.
    #[must_use]
    pub fn private_message_delivered(
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::PrivateMessageDelivered {
            target: target.into(),
            message: message.into(),
        }
    }
}

/// An inbound client frame.
///
/// Unrecognized fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// The message text, possibly a `/pm` command.
    pub message: String,
}

impl InboundFrame {
    /// Create a new inbound frame.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_kind() {
        assert_eq!(Event::user_join("alice").kind(), EventKind::UserJoin);
        assert_eq!(
            Event::private_message_delivered("bob", "hi").kind(),
            EventKind::PrivateMessageDelivered
        );
        assert_eq!(EventKind::ChatMessage.to_string(), "chat_message");
    }

    #[test]
    fn test_event_wire_shapes() {
        let cases = [
            (
                Event::user_list(vec!["alice".into(), "bob".into()]),
                json!({"type": "user_list", "users": ["alice", "bob"]}),
            ),
            (
                Event::user_leave("alice"),
                json!({"type": "user_leave", "user": "alice"}),
            ),
            (
                Event::chat_message("alice", "hi room"),
                json!({"type": "chat_message", "user": "alice", "message": "hi room"}),
            ),
            (
                Event::private_message_delivered("bob", "hello there"),
                json!({"type": "private_message_delivered", "target": "bob", "message": "hello there"}),
            ),
        ];

        for (event, expected) in cases {
            assert_eq!(serde_json::to_value(&event).unwrap(), expected);
        }
    }

    #[test]
    fn test_inbound_ignores_unknown_fields() {
        let frame: InboundFrame =
            serde_json::from_value(json!({"message": "hi", "extra": 42})).unwrap();
        assert_eq!(frame.message, "hi");
    }
}
