//! # huddle-protocol
//!
//! Wire protocol definitions for the Huddle chat relay.
//!
//! Clients send JSON text frames of the form `{"message": "..."}` and receive
//! JSON event objects tagged by `type`.
//!
//! ## Event Types
//!
//! - `user_list` - Presence snapshot for a newly joined connection
//! - `user_join` / `user_leave` - Presence changes
//! - `chat_message` - Room broadcast
//! - `private_message` / `private_message_delivered` - Inbox delivery and its acknowledgment
//!
//! ## Example
//!
//! ```rust
//! use huddle_protocol::{codec, Event};
//!
//! let event = Event::chat_message("alice", "hi room");
//! let text = codec::encode(&event).unwrap();
//! assert_eq!(codec::decode(&text).unwrap(), event);
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, decode_inbound, encode, ProtocolError};
pub use events::{Event, EventKind, InboundFrame};
