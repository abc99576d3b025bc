//! Connection handlers for the Huddle server.
//!
//! This module handles the HTTP routes and drives each connection: a writer
//! task drains the connection's mailbox into the transport and keeps it
//! alive with pings, while the reader loop feeds client frames to the room
//! session. Whichever side stops first ends the connection, and the session
//! is disconnected exactly once.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use huddle_core::{
    mailbox, ConnectionId, GroupId, GroupRegistry, Hub, Identity, InMemoryMessageStore, Mailbox,
    RoomId, RoomLookup, RoomSession, StaticRoomDirectory,
};
use huddle_transport::{Connection, ConnectionSink, Inbound, WebSocketConnection};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// How long a finished reader waits for the writer to flush.
const WRITER_GRACE: Duration = Duration::from_secs(5);

/// Shared server state.
pub struct AppState {
    /// Registry and message store shared by all sessions.
    pub hub: Hub,
    /// Room directory.
    pub rooms: Arc<dyn RoomLookup>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(GroupRegistry::new());
        let store = Arc::new(InMemoryMessageStore::new(config.rooms.history_limit));
        let rooms = Arc::new(StaticRoomDirectory::new(config.rooms.names.iter().cloned()));

        Self {
            hub: Hub::with_persist_capacity(registry, store, config.limits.persist_queue),
            rooms,
            config,
        }
    }

    fn update_gauges(&self) {
        let stats = self.hub.registry.stats();
        metrics::set_registry_stats(stats.group_count, stats.online_count);
    }

    /// Resolve a room name, mapping failures to HTTP responses.
    async fn resolve_room(&self, name: &str) -> Result<RoomId, Response> {
        match self.rooms.resolve(name).await {
            Ok(Some(room)) => Ok(room),
            Ok(None) => Err((StatusCode::NOT_FOUND, "Room not found").into_response()),
            Err(e) => {
                error!(room = %name, error = %e, "Room lookup failed");
                metrics::record_error("lookup");
                Err((StatusCode::SERVICE_UNAVAILABLE, "Room lookup failed").into_response())
            }
        }
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.websocket_route(), get(ws_handler))
        .route("/rooms/:room/online", get(online_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Huddle server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr,
        config.websocket_route()
    );

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.hub.registry.stats();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "groups": stats.group_count,
        "online": stats.online_count,
    }))
}

/// Presence listing handler.
async fn online_handler(
    Path(room): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let room_id = match state.resolve_room(&room).await {
        Ok(room_id) => room_id,
        Err(response) => return response,
    };
    let members = state.hub.registry.presence_snapshot(&GroupId::room(&room_id));
    let users: Vec<&str> = members.iter().map(|m| m.username.as_str()).collect();
    Json(serde_json::json!({ "room": room_id, "users": users, "members": members }))
        .into_response()
}

/// Read the proxy-verified username from the request headers.
fn identity_from_headers(headers: &HeaderMap, header: &str) -> Identity {
    let username = headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string());
    Identity::from_username(username)
}

/// WebSocket upgrade handler.
///
/// Unknown rooms are rejected before the upgrade.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room): Path<String>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let room_id = match state.resolve_room(&room).await {
        Ok(room_id) => room_id,
        Err(response) => {
            debug!(room = %room, remote = %remote, "Rejecting connection");
            metrics::record_rejection();
            return response;
        }
    };
    let identity = identity_from_headers(&headers, &state.config.auth.user_header);
    let max_message_size = state.config.limits.max_message_size;

    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| async move {
            let conn = WebSocketConnection::new(socket, max_message_size).with_remote_addr(remote);
            serve_connection(Box::new(conn), state, room_id, identity).await;
        })
}

/// Drive one connection from join to disconnect.
pub async fn serve_connection(
    conn: Box<dyn Connection>,
    state: Arc<AppState>,
    room: RoomId,
    identity: Identity,
) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate();
    debug!(
        connection = %connection_id,
        remote = conn.remote_addr().as_deref().unwrap_or("unknown"),
        "Connection accepted"
    );

    let (handle, mailbox) = mailbox(connection_id.clone(), state.config.limits.mailbox_capacity);
    let (sink, mut stream) = conn.split();

    let mut writer = tokio::spawn(write_loop(
        mailbox,
        sink,
        state.config.heartbeat.interval(),
    ));
    let mut session = RoomSession::join(state.hub.clone(), room, identity, handle);
    state.update_gauges();

    let idle_timeout = state.config.heartbeat.timeout();
    let mut writer_done = false;

    loop {
        tokio::select! {
            _ = &mut writer => {
                debug!(connection = %connection_id, "Writer finished");
                writer_done = true;
                break;
            }

            next = tokio::time::timeout(idle_timeout, stream.recv()) => {
                match next {
                    Ok(Ok(Some(Inbound::Text(text)))) => {
                        let outcome = session.handle_frame(&text);
                        metrics::record_frame(&outcome);
                    }
                    Ok(Ok(Some(Inbound::Heartbeat))) => {}
                    Ok(Ok(None)) => {
                        debug!(connection = %connection_id, "Connection closed by peer");
                        break;
                    }
                    Ok(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "Transport error");
                        metrics::record_error("transport");
                        break;
                    }
                    Err(_) => {
                        warn!(connection = %connection_id, "Connection idle timeout");
                        metrics::record_error("idle_timeout");
                        break;
                    }
                }
            }
        }
    }

    session.disconnect();
    // Dropping the session releases the last sender, so the writer drains
    // what is queued and exits.
    drop(session);
    state.update_gauges();

    if !writer_done && tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        warn!(connection = %connection_id, "Writer did not finish, aborting");
        writer.abort();
    }

    debug!(connection = %connection_id, "Connection finished");
}

/// Why a connection's writer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterExit {
    /// Every handle was dropped and the queue was flushed.
    Drained,
    /// The connection was dropped as a slow consumer.
    Evicted,
    /// The transport refused a frame.
    TransportFailed,
}

/// Drain the mailbox into the transport, pinging on the heartbeat interval.
async fn write_loop(
    mut mailbox: Mailbox,
    mut sink: Box<dyn ConnectionSink>,
    heartbeat: Duration,
) -> WriterExit {
    let mut ticker = tokio::time::interval(heartbeat);
    ticker.tick().await;

    let exit = loop {
        tokio::select! {
            envelope = mailbox.recv() => {
                let Some(envelope) = envelope else {
                    break if mailbox.is_evicted() {
                        WriterExit::Evicted
                    } else {
                        WriterExit::Drained
                    };
                };
                if let Err(e) = sink.send_text(envelope.text.clone()).await {
                    warn!(connection = %mailbox.id(), error = %e, "Send failed");
                    metrics::record_error("send");
                    break WriterExit::TransportFailed;
                }
                metrics::record_outbound(envelope.event.kind().as_str());
            }

            _ = ticker.tick() => {
                if let Err(e) = sink.ping().await {
                    debug!(connection = %mailbox.id(), error = %e, "Ping failed");
                    break WriterExit::TransportFailed;
                }
            }
        }
    };

    if exit == WriterExit::Evicted {
        debug!(connection = %mailbox.id(), "Closing evicted connection");
        metrics::record_eviction();
    }
    if let Err(e) = sink.close().await {
        debug!(connection = %mailbox.id(), error = %e, "Close failed");
    }
    exit
}
