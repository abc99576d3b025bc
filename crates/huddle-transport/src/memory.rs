//! In-process transport.
//!
//! [`pair`] returns a [`Connection`] for the server side and a
//! [`MemoryClient`] that plays the remote peer. Used to drive the server's
//! connection loop in tests without sockets.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::traits::{Connection, ConnectionSink, ConnectionStream, Inbound, TransportError};

/// What the server sent to a memory client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// A text frame.
    Text(String),
    /// A keepalive ping.
    Ping,
    /// The server closed the connection.
    Close,
}

/// Create a connected server/client pair.
#[must_use]
pub fn pair() -> (MemoryConnection, MemoryClient) {
    let (to_server, from_client) = mpsc::unbounded_channel();
    let (to_client, from_server) = mpsc::unbounded_channel();
    (
        MemoryConnection {
            inbound: from_client,
            outbound: to_client,
        },
        MemoryClient {
            outbound: Some(to_server),
            inbound: from_server,
        },
    )
}

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    inbound: mpsc::UnboundedReceiver<Result<Inbound, TransportError>>,
    outbound: mpsc::UnboundedSender<ServerFrame>,
}

impl Connection for MemoryConnection {
    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }

    fn split(self: Box<Self>) -> (Box<dyn ConnectionSink>, Box<dyn ConnectionStream>) {
        (
            Box::new(MemorySink {
                outbound: self.outbound,
                closed: false,
            }),
            Box::new(MemoryStream {
                inbound: self.inbound,
            }),
        )
    }
}

struct MemorySink {
    outbound: mpsc::UnboundedSender<ServerFrame>,
    closed: bool,
}

impl MemorySink {
    fn push(&self, frame: ServerFrame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

#[async_trait]
impl ConnectionSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.push(ServerFrame::Text(text))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.push(ServerFrame::Ping)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        let result = self.push(ServerFrame::Close);
        self.closed = true;
        result
    }
}

struct MemoryStream {
    inbound: mpsc::UnboundedReceiver<Result<Inbound, TransportError>>,
}

#[async_trait]
impl ConnectionStream for MemoryStream {
    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError> {
        match self.inbound.recv().await {
            Some(Ok(inbound)) => Ok(Some(inbound)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Client side of an in-memory connection.
pub struct MemoryClient {
    outbound: Option<mpsc::UnboundedSender<Result<Inbound, TransportError>>>,
    inbound: mpsc::UnboundedReceiver<ServerFrame>,
}

impl MemoryClient {
    fn push(&self, item: Result<Inbound, TransportError>) -> bool {
        self.outbound
            .as_ref()
            .map(|tx| tx.send(item).is_ok())
            .unwrap_or(false)
    }

    /// Send a text frame. Returns `false` if the server side is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.push(Ok(Inbound::Text(text.into())))
    }

    /// Send a liveness signal.
    pub fn heartbeat(&self) -> bool {
        self.push(Ok(Inbound::Heartbeat))
    }

    /// Make the server's next receive fail, as on a broken socket.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.push(Err(TransportError::ReceiveFailed(reason.into())))
    }

    /// Close the client side cleanly.
    pub fn close(&mut self) {
        self.outbound = None;
    }

    /// Receive the next frame from the server.
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        self.inbound.recv().await
    }

    /// Receive the next text frame, skipping pings.
    ///
    /// Returns `None` once the server closes or goes away.
    pub async fn recv_text(&mut self) -> Option<String> {
        loop {
            match self.inbound.recv().await? {
                ServerFrame::Text(text) => return Some(text),
                ServerFrame::Ping => continue,
                ServerFrame::Close => return None,
            }
        }
    }
}
