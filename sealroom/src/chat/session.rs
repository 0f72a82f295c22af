//! Per-connection key exchange state.
//!
//! A [`PeerSession`] walks `Idle → KeyGenerated → SharedKeyDerived`. It
//! produces the client events to send and turns relay events into
//! [`ChatEvent`]s, but never touches the network itself; [`super::ChatClient`]
//! does the I/O.

use std::sync::Arc;

use p256::PublicKey;
use sealroom_proto::codec::{self, CodecError};
use sealroom_proto::event::{ClientEvent, EncryptedEnvelope, ServerEvent};
use serde_json::Value;

use super::ChatEvent;
use crate::crypto::cipher::SharedKey;
use crate::crypto::keys::{self, EphemeralKeyPair};
use crate::crypto::{CryptoError, offload};

/// Display name used when none is given.
pub const DEFAULT_USERNAME: &str = "Anon";

/// Room joined when none is given.
pub const DEFAULT_ROOM: &str = "room1";

/// Largest encoded frame sent by default, matching the relay's limit (64 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Errors raised by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No key pair yet; call [`PeerSession::start`] first.
    #[error("session has not been started")]
    NotStarted,

    /// [`PeerSession::start`] was called twice.
    #[error("session already started")]
    AlreadyStarted,

    /// Sending requires a derived shared key.
    #[error("no shared key yet, wait for a peer to join")]
    NoSharedKey,

    /// The message is empty after trimming.
    #[error("refusing to send an empty message")]
    EmptyMessage,

    /// The encrypted frame would exceed the relay's message size limit.
    #[error("message too large: {size} bytes encrypted (max {max} bytes)")]
    MessageTooLarge {
        /// Encoded frame length in bytes.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// A cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// An envelope could not be converted to or from JSON.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Where a session is in the key exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No key pair generated yet.
    Idle,
    /// Local key pair exists, no peer key received.
    KeyGenerated,
    /// A shared key has been derived from a peer's public key.
    SharedKeyDerived,
}

/// The peer whose public key produced the current shared key.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    /// Endpoint id stamped by the relay.
    pub id: String,
    /// Display name the peer claimed.
    pub username: String,
    /// The imported public key.
    pub public_key: PublicKey,
}

/// Client-side key exchange state for one room.
pub struct PeerSession {
    username: String,
    room: String,
    max_message_size: usize,
    key_pair: Option<Arc<EphemeralKeyPair>>,
    peer: Option<PeerInfo>,
    shared_key: Option<Arc<SharedKey>>,
}

impl PeerSession {
    /// Creates an idle session.
    ///
    /// A blank username becomes [`DEFAULT_USERNAME`] and a blank room
    /// becomes [`DEFAULT_ROOM`].
    #[must_use]
    pub fn new(username: &str, room: &str) -> Self {
        Self {
            username: non_blank_or(username, DEFAULT_USERNAME),
            room: non_blank_or(room, DEFAULT_ROOM),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            key_pair: None,
            peer: None,
            shared_key: None,
        }
    }

    /// Caps the encoded size of outgoing `encrypted-message` frames.
    #[must_use]
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Display name sent with the public key and every message.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Room this session joins.
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Current position in the key exchange.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        match (&self.key_pair, &self.shared_key) {
            (None, _) => SessionState::Idle,
            (Some(_), None) => SessionState::KeyGenerated,
            (Some(_), Some(_)) => SessionState::SharedKeyDerived,
        }
    }

    /// The peer the current shared key was derived with.
    #[must_use]
    pub const fn peer(&self) -> Option<&PeerInfo> {
        self.peer.as_ref()
    }

    /// Fingerprint of the local public key, once generated.
    #[must_use]
    pub fn fingerprint(&self) -> Option<String> {
        self.key_pair.as_ref().map(|pair| pair.fingerprint())
    }

    /// The derived shared key, if any.
    #[must_use]
    pub fn shared_key(&self) -> Option<&SharedKey> {
        self.shared_key.as_deref()
    }

    /// Generates the local key pair and returns the `join` and
    /// `public-key` events to send, in that order.
    ///
    /// # Errors
    ///
    /// [`SessionError::AlreadyStarted`] on a second call, or a crypto error
    /// if key generation or export fails.
    pub async fn start(&mut self) -> Result<[ClientEvent; 2], SessionError> {
        if self.key_pair.is_some() {
            return Err(SessionError::AlreadyStarted);
        }
        let pair = offload(|| Ok(EphemeralKeyPair::generate())).await?;
        tracing::info!(
            room = %self.room,
            fingerprint = %pair.fingerprint(),
            "generated session key pair"
        );
        self.key_pair = Some(Arc::new(pair));
        Ok([self.join_event(), self.announce_event()?])
    }

    /// The `join` event for this session's room.
    #[must_use]
    pub fn join_event(&self) -> ClientEvent {
        ClientEvent::Join(self.room.clone())
    }

    /// The `public-key` event announcing the local public key.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotStarted`] before [`start`](Self::start).
    pub fn announce_event(&self) -> Result<ClientEvent, SessionError> {
        let pair = self.key_pair.as_ref().ok_or(SessionError::NotStarted)?;
        Ok(ClientEvent::PublicKey {
            room: self.room.clone(),
            public_key: pair.public_key_value()?,
            username: self.username.clone(),
        })
    }

    /// Imports a peer's public key and derives the shared key from it.
    ///
    /// A key from a different peer replaces the current shared key.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotStarted`] before [`start`](Self::start), or
    /// [`CryptoError::InvalidPublicKey`] if `public_key` is not a P-256 JWK.
    /// The previous shared key is kept on error.
    pub async fn accept_peer_key(
        &mut self,
        from: &str,
        username: &str,
        public_key: &Value,
    ) -> Result<(), SessionError> {
        let pair = Arc::clone(self.key_pair.as_ref().ok_or(SessionError::NotStarted)?);
        let value = public_key.clone();
        let (peer_key, shared) = offload(move || {
            let peer_key = keys::parse_public_key(&value)?;
            let shared = pair.derive_shared_key(&peer_key);
            Ok((peer_key, shared))
        })
        .await?;

        if let Some(previous) = &self.peer
            && previous.id != from
        {
            tracing::warn!(
                previous = %previous.id,
                replacement = %from,
                room = %self.room,
                "another peer announced a key, replacing the shared key"
            );
        }
        tracing::info!(
            peer = %from,
            fingerprint = %keys::fingerprint(&peer_key),
            "derived shared key"
        );

        self.peer = Some(PeerInfo {
            id: from.to_string(),
            username: non_blank_or(username, DEFAULT_USERNAME),
            public_key: peer_key,
        });
        self.shared_key = Some(Arc::new(shared));
        Ok(())
    }

    /// Encrypts `text` into an `encrypted-message` event for this room.
    ///
    /// # Errors
    ///
    /// [`SessionError::EmptyMessage`] if `text` is blank,
    /// [`SessionError::NoSharedKey`] before a peer key has been accepted,
    /// [`SessionError::MessageTooLarge`] if the encoded frame would be
    /// refused by the relay.
    pub async fn seal(&self, text: &str) -> Result<ClientEvent, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let key = Arc::clone(self.shared_key.as_ref().ok_or(SessionError::NoSharedKey)?);
        let plaintext = text.to_string();
        let username = self.username.clone();
        let envelope = offload(move || key.seal(&plaintext, &username)).await?;

        let event = ClientEvent::EncryptedMessage {
            room: self.room.clone(),
            payload: envelope.to_value()?,
        };
        // The relay closes connections that send oversized frames.
        let size = codec::encode(&event)?.len();
        if size > self.max_message_size {
            return Err(SessionError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        Ok(event)
    }

    /// Applies one relay event to the session and classifies it.
    pub async fn handle(&mut self, event: ServerEvent) -> ChatEvent {
        match event {
            ServerEvent::Connected { id } => ChatEvent::Connected { id },
            ServerEvent::PeerJoined { id } => ChatEvent::PeerJoined { id },
            ServerEvent::PublicKey {
                public_key,
                from,
                username,
            } => match self.accept_peer_key(&from, &username, &public_key).await {
                Ok(()) => ChatEvent::KeyEstablished {
                    from,
                    username: non_blank_or(&username, DEFAULT_USERNAME),
                },
                Err(e) => {
                    tracing::warn!(peer = %from, err = %e, "rejected peer public key");
                    ChatEvent::KeyRejected {
                        from,
                        reason: e.to_string(),
                    }
                }
            },
            ServerEvent::EncryptedMessage { payload, from } => self.open(payload, from).await,
        }
    }

    async fn open(&self, payload: Value, from: String) -> ChatEvent {
        let Some(key) = self.shared_key.as_ref().map(Arc::clone) else {
            tracing::debug!(peer = %from, "ciphertext arrived before key exchange");
            return ChatEvent::NoSharedKey { from };
        };
        let envelope = match EncryptedEnvelope::from_value(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(peer = %from, err = %e, "malformed encrypted payload");
                return ChatEvent::DecryptionFailed { from };
            }
        };
        let username = non_blank_or(&envelope.from_username, DEFAULT_USERNAME);

        match offload(move || key.open(&envelope)).await {
            Ok(text) => ChatEvent::Message {
                from,
                username,
                text,
            },
            Err(e) => {
                tracing::warn!(peer = %from, err = %e, "could not decrypt message");
                ChatEvent::DecryptionFailed { from }
            }
        }
    }
}

fn non_blank_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
