//! # huddle-transport
//!
//! Transport abstraction layer for the Huddle chat relay.
//!
//! This crate provides a unified interface over the wire transports:
//!
//! - **WebSocket** - axum WebSocket connections
//! - **Memory** - In-process connections for tests and embedding
//!
//! ## Transport Abstraction
//!
//! All transports implement the `Connection` trait, which splits into a
//! `ConnectionSink` and a `ConnectionStream`, allowing the server to be
//! protocol-agnostic.
//!
//! ```rust,ignore
//! use huddle_transport::{Connection, Inbound};
//!
//! async fn handle_connection(conn: Box<dyn Connection>) {
//!     let (mut sink, mut stream) = conn.split();
//!     while let Ok(Some(Inbound::Text(text))) = stream.recv().await {
//!         sink.send_text(text).await.ok();
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{Connection, ConnectionSink, ConnectionStream, Inbound, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;
