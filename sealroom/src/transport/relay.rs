//! WebSocket relay client for `SealRoom`.
//!
//! Connects to the relay, waits for the `connected` event that carries
//! this endpoint's id, then hands decoded [`ServerEvent`]s to the caller
//! through a channel fed by a background reader task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sealroom_proto::codec;
use sealroom_proto::event::{ClientEvent, ServerEvent};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::TransportError;

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// A live connection to a `SealRoom` relay.
///
/// Created via [`RelayClient::connect`], which opens the WebSocket, reads
/// the assigned endpoint id, and spawns a background reader task.
pub struct RelayClient {
    /// Endpoint id the relay assigned to this connection.
    endpoint_id: String,
    /// The relay server URL (ws:// or wss://).
    relay_url: String,
    /// Write half of the WebSocket connection.
    ws_sender: Mutex<WsSender>,
    /// Events decoded by the background reader task.
    incoming: Mutex<mpsc::Receiver<ServerEvent>>,
    /// Whether the WebSocket connection to the relay is active.
    connected: Arc<AtomicBool>,
    /// Handle to the background reader task.
    reader_handle: tokio::task::JoinHandle<()>,
}

impl RelayClient {
    /// Connect to a relay server.
    ///
    /// Both the TCP/WebSocket handshake and the wait for the `connected`
    /// event are bounded by `timeout`. `channel_capacity` bounds how many
    /// received events may wait unread.
    ///
    /// # Errors
    ///
    /// - [`TransportError::InvalidUrl`] if `relay_url` is not ws/wss.
    /// - [`TransportError::Timeout`] if connecting or the greeting times out.
    /// - [`TransportError::Unreachable`] if the WebSocket handshake fails.
    /// - [`TransportError::Protocol`] if the first event is not `connected`.
    pub async fn connect(
        relay_url: &str,
        timeout: Duration,
        channel_capacity: usize,
    ) -> Result<Self, TransportError> {
        let url = url::Url::parse(relay_url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme {:?}",
                url.scheme()
            )));
        }

        let (ws_stream, _response) = tokio::time::timeout(timeout, connect_async(relay_url))
            .await
            .map_err(|_| {
                tracing::warn!(url = relay_url, "relay WebSocket connect timed out");
                TransportError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url = relay_url, err = %e, "relay WebSocket connect failed");
                TransportError::Unreachable(format!("{relay_url}: {e}"))
            })?;

        let (ws_sender, mut ws_reader) = ws_stream.split();

        let endpoint_id = tokio::time::timeout(timeout, wait_for_greeting(&mut ws_reader))
            .await
            .map_err(|_| {
                tracing::warn!(url = relay_url, "relay greeting timed out");
                TransportError::Timeout
            })??;
        tracing::info!(endpoint = %endpoint_id, url = relay_url, "connected to relay");

        let (tx, rx) = mpsc::channel(channel_capacity);
        let connected = Arc::new(AtomicBool::new(true));
        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, Arc::clone(&connected)));

        Ok(Self {
            endpoint_id,
            relay_url: relay_url.to_string(),
            ws_sender: Mutex::new(ws_sender),
            incoming: Mutex::new(rx),
            connected,
            reader_handle,
        })
    }

    /// Sends one event to the relay.
    ///
    /// # Errors
    ///
    /// - [`TransportError::ConnectionClosed`] if the connection is down.
    /// - [`TransportError::Codec`] if the event cannot be encoded.
    pub async fn send(&self, event: &ClientEvent) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }
        let text = codec::encode(event)?;

        let mut sender = self.ws_sender.lock().await;
        sender.send(Message::Text(text.into())).await.map_err(|e| {
            tracing::warn!(err = %e, "relay send failed");
            self.connected.store(false, Ordering::Relaxed);
            TransportError::ConnectionClosed
        })
    }

    /// Receives the next event from the relay.
    ///
    /// Cancel-safe: dropping the future loses no event.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] once the reader task has
    /// exited and every buffered event has been consumed.
    pub async fn recv(&self) -> Result<ServerEvent, TransportError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    /// Endpoint id assigned by the relay.
    #[must_use]
    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    /// The relay URL this client connected to.
    #[must_use]
    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    /// Whether the WebSocket is still open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Sends a close frame and stops the reader task.
    pub async fn close(&self) {
        let mut sender = self.ws_sender.lock().await;
        if let Err(e) = sender.close().await {
            tracing::debug!(err = %e, "error while closing relay WebSocket");
        }
        self.connected.store(false, Ordering::Relaxed);
        self.reader_handle.abort();
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

/// Reads frames until the relay's `connected` event arrives.
async fn wait_for_greeting(ws_reader: &mut WsReader) -> Result<String, TransportError> {
    while let Some(frame) = ws_reader.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                return match codec::decode_server(text.as_str()) {
                    Ok(ServerEvent::Connected { id }) => Ok(id),
                    Ok(other) => Err(TransportError::Protocol(format!(
                        "expected connected event, got {other:?}"
                    ))),
                    Err(e) => Err(TransportError::Protocol(format!("malformed greeting: {e}"))),
                };
            }
            Ok(Message::Close(_)) => return Err(TransportError::ConnectionClosed),
            Ok(_) => {
                // Ping/pong/binary before the greeting are skipped.
            }
            Err(e) => return Err(TransportError::WebSocket(e.to_string())),
        }
    }
    Err(TransportError::ConnectionClosed)
}

/// Background task that decodes relay frames into [`ServerEvent`]s.
///
/// Malformed frames are logged and skipped; the task does not disconnect on
/// bad data. Sets `connected` to `false` when the WebSocket closes or errors.
async fn reader_loop(
    mut ws_reader: WsReader,
    tx: mpsc::Sender<ServerEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match codec::decode_server(text.as_str()) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        // Receiver dropped: the client is gone.
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed relay frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("relay WebSocket closed by server");
                break;
            }
            Ok(_) => {
                // Ping/pong/binary frames carry no events.
            }
            Err(e) => {
                tracing::warn!(err = %e, "relay WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::info!("relay reader task exiting");
}
