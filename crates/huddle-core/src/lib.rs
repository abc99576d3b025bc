//! # huddle-core
//!
//! Connection, room, presence and message routing engine for the Huddle
//! chat relay.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Connection** - Cloneable handles over bounded per-connection mailboxes
//! - **Group** - Room broadcast groups and per-user inbox groups
//! - **Registry** - The shared, sharded group table with fan-out
//! - **Presence** - Reference-counted online users per room
//! - **Router** - Pure routing of inbound frames
//! - **Session** - Per-connection room lifecycle
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │────▶│ RoomSession │────▶│   Router    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │
//!        │                   ▼
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Mailbox   │◀────│  Registry   │────▶│  Presence   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```

pub mod connection;
pub mod group;
pub mod message;
pub mod presence;
pub mod registry;
pub mod router;
pub mod session;
pub mod store;

pub use connection::{mailbox, ConnectionHandle, ConnectionId, Identity, Mailbox, SendError};
pub use group::{Group, GroupId, RoomId};
pub use message::Envelope;
pub use presence::{Presence, PresenceState};
pub use registry::{Delivery, GroupRegistry, RegistryStats};
pub use router::{route, RouteError, RouterAction};
pub use session::{FrameOutcome, Hub, RoomSession, SessionError, SessionState};
pub use store::{
    InMemoryMessageStore, LookupError, MessageStore, PersistQueue, RoomLookup, StaticRoomDirectory,
    StoreError, StoredMessage,
};
