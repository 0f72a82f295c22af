//! Transport layer for `SealRoom`.
//!
//! [`relay::RelayClient`] carries protocol events to and from the relay
//! over a WebSocket. The transport never sees plaintext: chat text is
//! sealed before it reaches [`relay::RelayClient::send`].

pub mod relay;

use sealroom_proto::codec::CodecError;

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection to the relay has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// The relay URL is not a usable `ws://` or `wss://` URL.
    #[error("invalid relay url: {0}")]
    InvalidUrl(String),

    /// The relay could not be reached.
    #[error("relay {0} is unreachable")]
    Unreachable(String),

    /// The relay did not follow the protocol during connection setup.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// An event could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// An underlying WebSocket error occurred.
    #[error("WebSocket error: {0}")]
    WebSocket(String),
}
