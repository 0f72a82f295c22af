//! Text-frame encoding for `SealRoom` events.
//!
//! Events are serialized to JSON strings, one event per WebSocket text
//! frame. The transport preserves message boundaries, so no length
//! prefix is needed.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::event::{ClientEvent, EncryptedEnvelope, ServerEvent};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The frame is not a recognizable event.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Encodes any protocol value into a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a JSON text frame into a protocol value.
///
/// # Errors
///
/// Returns `CodecError::InvalidFrame` if the text is not valid JSON for `T`.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::InvalidFrame(e.to_string()))
}

/// Decodes a frame sent by a client.
///
/// # Errors
///
/// Returns `CodecError::InvalidFrame` for anything that is not a [`ClientEvent`].
pub fn decode_client(text: &str) -> Result<ClientEvent, CodecError> {
    decode(text)
}

/// Decodes a frame sent by the relay.
///
/// # Errors
///
/// Returns `CodecError::InvalidFrame` for anything that is not a [`ServerEvent`].
pub fn decode_server(text: &str) -> Result<ServerEvent, CodecError> {
    decode(text)
}

impl EncryptedEnvelope {
    /// Converts the envelope into the opaque JSON value carried by events.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Serialization` if serialization fails.
    pub fn to_value(&self) -> Result<Value, CodecError> {
        serde_json::to_value(self).map_err(|e| CodecError::Serialization(e.to_string()))
    }

    /// Interprets an opaque event payload as an envelope.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::InvalidFrame` if the value lacks `iv` or `cipher`.
    pub fn from_value(value: Value) -> Result<Self, CodecError> {
        serde_json::from_value(value).map_err(|e| CodecError::InvalidFrame(e.to_string()))
    }
}
