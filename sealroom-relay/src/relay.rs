//! Relay server core: shared state, WebSocket handler, and room fan-out.
//!
//! The relay accepts WebSocket connections, assigns each one an
//! [`EndpointId`], and forwards `peer-joined`, `public-key` and
//! `encrypted-message` events to every *other* member of a room. Key
//! material and ciphertext are forwarded as opaque JSON; nothing is
//! validated, stored, or queued.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::{SinkExt, StreamExt};
use sealroom_proto::codec;
use sealroom_proto::event::{ClientEvent, ServerEvent};
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::rooms::RoomRegistry;

/// Default maximum accepted WebSocket message size in bytes (64 KB).
const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Identifier the relay assigns to one connection for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointId(String);

impl EndpointId {
    /// Generates a fresh, time-ordered endpoint id (UUID v7).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the string form sent to clients.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EndpointId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EndpointId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared relay state: live connections plus room membership.
pub struct RelayState {
    /// Maps each endpoint to the channel feeding its WebSocket writer.
    connections: RwLock<HashMap<EndpointId, mpsc::UnboundedSender<Message>>>,
    /// Room name to member endpoints.
    pub rooms: RoomRegistry,
    /// Largest WebSocket message accepted from a client.
    max_message_size: usize,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates an empty relay state with the default message size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Creates an empty relay state with a custom message size limit.
    #[must_use]
    pub fn with_config(max_message_size: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            rooms: RoomRegistry::new(),
            max_message_size,
        }
    }

    /// Returns the configured maximum message size.
    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Registers an endpoint's outbound channel.
    ///
    /// Returns the previous sender if the id was already registered.
    pub async fn register(
        &self,
        endpoint: &EndpointId,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Option<mpsc::UnboundedSender<Message>> {
        let mut conns = self.connections.write().await;
        conns.insert(endpoint.clone(), sender)
    }

    /// Removes an endpoint's outbound channel, returning it if it existed.
    pub async fn unregister(&self, endpoint: &EndpointId) -> Option<mpsc::UnboundedSender<Message>> {
        let mut conns = self.connections.write().await;
        conns.remove(endpoint)
    }

    /// Returns a clone of the sender for the given endpoint, if connected.
    #[cfg(test)]
    pub(crate) async fn get_sender(&self, endpoint: &EndpointId) -> Option<mpsc::UnboundedSender<Message>> {
        let conns = self.connections.read().await;
        conns.get(endpoint).cloned()
    }

    /// Returns the number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Adds `endpoint` to `room` and tells the other members about it.
    ///
    /// Joining a room twice is harmless; the other members are notified
    /// each time, as the join itself is what gets announced.
    pub async fn join(&self, endpoint: &EndpointId, room: &str) {
        let added = self.rooms.join(room, endpoint).await;
        tracing::info!(endpoint = %endpoint, room = %room, added, "endpoint joined room");

        let event = ServerEvent::PeerJoined {
            id: endpoint.to_string(),
        };
        self.broadcast(room, endpoint, &event).await;
    }

    /// Forwards a public key announcement to the other members of `room`.
    ///
    /// The sender does not have to be a member of `room`.
    pub async fn announce_key(
        &self,
        endpoint: &EndpointId,
        room: &str,
        public_key: Value,
        username: String,
    ) {
        let event = ServerEvent::PublicKey {
            public_key,
            from: endpoint.to_string(),
            username,
        };
        let delivered = self.broadcast(room, endpoint, &event).await;
        tracing::debug!(endpoint = %endpoint, room = %room, delivered, "public key relayed");
    }

    /// Forwards an encrypted envelope to the other members of `room`.
    pub async fn relay_message(&self, endpoint: &EndpointId, room: &str, payload: Value) {
        let event = ServerEvent::EncryptedMessage {
            payload,
            from: endpoint.to_string(),
        };
        let delivered = self.broadcast(room, endpoint, &event).await;
        tracing::debug!(endpoint = %endpoint, room = %room, delivered, "encrypted message relayed");
    }

    /// Drops the endpoint's connection and removes it from all rooms.
    ///
    /// Departures are not announced to the remaining members.
    pub async fn disconnect(&self, endpoint: &EndpointId) {
        self.unregister(endpoint).await;
        let left = self.rooms.leave_all(endpoint).await;
        tracing::info!(endpoint = %endpoint, rooms = left.len(), "endpoint disconnected");
    }

    /// Sends `event` to every member of `room` except `except`.
    ///
    /// Returns how many endpoints the frame was handed to. Members whose
    /// writer has already gone away are skipped; their own connection
    /// handler cleans them up.
    async fn broadcast(&self, room: &str, except: &EndpointId, event: &ServerEvent) -> usize {
        let frame = match codec::encode(event) {
            Ok(text) => Utf8Bytes::from(text),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode server event");
                return 0;
            }
        };

        let recipients = self.rooms.others(room, except).await;
        let conns = self.connections.read().await;
        let mut delivered = 0;
        for recipient in &recipients {
            match conns.get(recipient) {
                Some(sender) if sender.send(Message::Text(frame.clone())).is_ok() => delivered += 1,
                _ => tracing::debug!(endpoint = %recipient, "skipping unreachable room member"),
            }
        }
        delivered
    }
}

/// Handles an upgraded WebSocket connection for a single endpoint.
///
/// The connection lifecycle:
/// 1. Assign an endpoint id and send `connected` with it.
/// 2. Register the endpoint's outbound channel.
/// 3. Dispatch incoming events until the socket closes or errors.
/// 4. Disconnect: drop the channel and leave every room.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let endpoint = EndpointId::generate();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let hello = ServerEvent::Connected {
        id: endpoint.to_string(),
    };
    if let Err(e) = send_event(&mut ws_sender, &hello).await {
        tracing::warn!(endpoint = %endpoint, error = %e, "failed to send connected event");
        return;
    }

    // Create a channel for sending messages to this endpoint's WebSocket writer.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.register(&endpoint, tx).await;
    tracing::info!(endpoint = %endpoint, "endpoint connected");

    // Spawn a writer task that forwards messages from the channel to the WebSocket.
    let writer_endpoint = endpoint.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(endpoint = %writer_endpoint, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: process incoming events from this endpoint.
    let reader_endpoint = endpoint.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    handle_text_message(&reader_endpoint, text.as_str(), &reader_state).await;
                }
                Ok(Message::Close(_)) => {
                    tracing::info!(endpoint = %reader_endpoint, "received close frame");
                    break;
                }
                Ok(Message::Binary(data)) => {
                    tracing::debug!(
                        endpoint = %reader_endpoint,
                        len = data.len(),
                        "ignoring binary frame"
                    );
                }
                Ok(_) => {
                    // Ping and pong are answered by the WebSocket layer.
                }
                Err(e) => {
                    tracing::warn!(endpoint = %reader_endpoint, error = %e, "WebSocket read error");
                    break;
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.disconnect(&endpoint).await;
}

/// Dispatches one text frame from a connected endpoint.
///
/// Frames that are not a recognizable client event are logged and dropped;
/// the connection stays open.
async fn handle_text_message(endpoint: &EndpointId, text: &str, state: &Arc<RelayState>) {
    let event = match codec::decode_client(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(endpoint = %endpoint, error = %e, "dropping undecodable frame");
            return;
        }
    };

    match event {
        ClientEvent::Join(room) => state.join(endpoint, &room).await,
        ClientEvent::PublicKey {
            room,
            public_key,
            username,
        } => state.announce_key(endpoint, &room, public_key, username).await,
        ClientEvent::EncryptedMessage { room, payload } => {
            state.relay_message(endpoint, &room, payload).await;
        }
    }
}

/// Encodes and sends a server event directly on a WebSocket sender.
async fn send_event(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    event: &ServerEvent,
) -> Result<(), String> {
    let text = codec::encode(event).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Body of the `/health` endpoint.
#[derive(Debug, serde::Serialize)]
pub struct HealthReport {
    /// Always `"ok"` while the server is answering.
    pub status: &'static str,
    /// Number of live connections.
    pub connections: usize,
    /// Number of non-empty rooms.
    pub rooms: usize,
}

/// Starts the relay server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .route("/health", axum::routing::get(health_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the relay server in-process for testing.
///
/// Binds to `127.0.0.1:0` (OS-assigned port).
#[cfg(test)]
pub async fn start_test_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server")
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.max_message_size(state.max_message_size())
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// axum handler reporting liveness and current load.
async fn health_handler(
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> axum::Json<HealthReport> {
    axum::Json(HealthReport {
        status: "ok",
        connections: state.connection_count().await,
        rooms: state.rooms.room_count().await,
    })
}
