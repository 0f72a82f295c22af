//! Wire event types for the `SealRoom` relay protocol.
//!
//! Every WebSocket text frame carries one event encoded as
//! `{"event": "<name>", "data": <payload>}`. Public keys and encrypted
//! payloads travel as opaque JSON values: the relay forwards them without
//! looking inside, and only clients interpret them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events sent by a client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Join the named room. The payload is the bare room name.
    Join(String),

    /// Announce this client's public key to the other members of `room`.
    PublicKey {
        /// Room to broadcast the key into.
        room: String,
        /// Serialized EC public key (JWK). Opaque to the relay.
        public_key: Value,
        /// Self-chosen display name. Not authenticated.
        #[serde(default)]
        username: String,
    },

    /// Relay an encrypted chat message to the other members of `room`.
    EncryptedMessage {
        /// Room to broadcast the message into.
        room: String,
        /// An [`EncryptedEnvelope`] in JSON form. Opaque to the relay.
        payload: Value,
    },
}

/// Events sent by the relay to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// First event on every connection: the endpoint id the relay assigned.
    Connected {
        /// Endpoint id of the receiving connection.
        id: String,
    },

    /// Another endpoint joined a room this client is in.
    PeerJoined {
        /// Endpoint id of the newcomer.
        id: String,
    },

    /// A peer announced its public key.
    PublicKey {
        /// Serialized EC public key, exactly as the sender provided it.
        public_key: Value,
        /// Endpoint id of the sender, stamped by the relay.
        from: String,
        /// Display name claimed by the sender.
        #[serde(default)]
        username: String,
    },

    /// A peer sent an encrypted chat message.
    EncryptedMessage {
        /// The sender's envelope, exactly as provided.
        payload: Value,
        /// Endpoint id of the sender, stamped by the relay.
        from: String,
    },
}

/// An AES-GCM sealed chat message as carried inside `encrypted-message`.
///
/// `iv` and `cipher` are standard base64 (padded). `cipher` includes the
/// 16-byte authentication tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    /// 96-bit nonce, base64.
    pub iv: String,
    /// Ciphertext with appended tag, base64.
    pub cipher: String,
    /// Display name of the sender, as claimed by the sender.
    #[serde(default)]
    pub from_username: String,
}
