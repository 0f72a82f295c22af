//! Chat application layer for `SealRoom`.
//!
//! [`ChatClient`] couples a [`RelayClient`] with a [`PeerSession`]: it
//! sends the join/key events, seals outgoing text, and turns relay events
//! into [`ChatEvent`]s. Plaintext only exists on this side of the
//! transport.

pub mod session;

use std::fmt;

use sealroom_proto::event::ServerEvent;

use crate::config::NetConfig;
use crate::transport::TransportError;
use crate::transport::relay::RelayClient;

use session::{PeerSession, SessionError};

/// Errors surfaced by [`ChatClient`].
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The relay connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The session refused the operation.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

/// What a relay event meant for this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The relay assigned this connection an endpoint id.
    Connected {
        /// Assigned endpoint id.
        id: String,
    },
    /// Another endpoint joined the room.
    PeerJoined {
        /// Endpoint id of the newcomer.
        id: String,
    },
    /// A shared key was derived from a peer's public key.
    KeyEstablished {
        /// Endpoint id of the peer.
        from: String,
        /// Display name the peer claimed.
        username: String,
    },
    /// A message was decrypted.
    Message {
        /// Endpoint id of the sender.
        from: String,
        /// Display name the sender claimed.
        username: String,
        /// Decrypted text.
        text: String,
    },
    /// A message could not be authenticated or decoded and was discarded.
    DecryptionFailed {
        /// Endpoint id of the sender.
        from: String,
    },
    /// A message arrived before any shared key existed.
    NoSharedKey {
        /// Endpoint id of the sender.
        from: String,
    },
    /// A peer's public key could not be imported.
    KeyRejected {
        /// Endpoint id of the peer.
        from: String,
        /// Why the key was refused.
        reason: String,
    },
}

impl fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected { id } => write!(f, "* connected as {id}"),
            Self::PeerJoined { id } => write!(f, "* {id} joined the room"),
            Self::KeyEstablished { username, .. } => {
                write!(f, "* shared key established with {username}")
            }
            Self::Message { username, text, .. } => write!(f, "{username}: {text}"),
            Self::DecryptionFailed { from } => {
                write!(f, "! message from {from} could not be decrypted")
            }
            Self::NoSharedKey { from } => {
                write!(f, "! cannot decrypt message from {from}: no shared key yet")
            }
            Self::KeyRejected { from, reason } => {
                write!(f, "! rejected key from {from}: {reason}")
            }
        }
    }
}

/// An encrypted chat connection to one room.
pub struct ChatClient {
    relay: RelayClient,
    session: PeerSession,
    announce_on_join: bool,
}

impl ChatClient {
    /// Connects to the relay, generates a key pair, joins the room and
    /// announces the public key.
    ///
    /// With [`NetConfig::announce_on_join`] set, every later `peer-joined`
    /// is answered with the public key so newcomers can derive the shared
    /// key too.
    ///
    /// # Errors
    ///
    /// [`ChatError::Transport`] if the relay is unreachable or the join
    /// cannot be sent; [`ChatError::Session`] if key generation fails.
    pub async fn connect(config: &NetConfig) -> Result<Self, ChatError> {
        let relay = RelayClient::connect(
            &config.relay_url,
            config.connect_timeout,
            config.channel_capacity,
        )
        .await?;
        let mut session = PeerSession::new(&config.username, &config.room)
            .with_max_message_size(config.max_message_size);

        for event in session.start().await? {
            relay.send(&event).await?;
        }
        tracing::info!(
            endpoint = relay.endpoint_id(),
            room = session.room(),
            username = session.username(),
            "joined room"
        );

        Ok(Self {
            relay,
            session,
            announce_on_join: config.announce_on_join,
        })
    }

    /// Endpoint id the relay assigned.
    #[must_use]
    pub fn endpoint_id(&self) -> &str {
        self.relay.endpoint_id()
    }

    /// Read access to the key exchange state.
    #[must_use]
    pub const fn session(&self) -> &PeerSession {
        &self.session
    }

    /// Re-sends the local public key so later joiners can derive the
    /// shared key.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Transport`] if the send fails.
    pub async fn announce_key(&self) -> Result<(), ChatError> {
        let event = self.session.announce_event()?;
        self.relay.send(&event).await?;
        tracing::debug!(room = self.session.room(), "re-announced public key");
        Ok(())
    }

    /// Encrypts and sends one chat message.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoSharedKey`] before a peer key arrives,
    /// [`SessionError::EmptyMessage`] for blank text,
    /// [`SessionError::MessageTooLarge`] if the relay would refuse the
    /// frame, or a transport error. Nothing is sent on a session error.
    pub async fn send_text(&self, text: &str) -> Result<(), ChatError> {
        let event = self.session.seal(text).await?;
        self.relay.send(&event).await?;
        Ok(())
    }

    /// Waits for the next raw relay event.
    ///
    /// Cancel-safe, so it can sit in a `tokio::select!` arm. Pass the
    /// result to [`handle`](Self::handle).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] when the relay goes away.
    pub async fn recv_event(&self) -> Result<ServerEvent, ChatError> {
        Ok(self.relay.recv().await?)
    }

    /// Applies a relay event to the session.
    ///
    /// A `peer-joined` is answered with the public key when
    /// `announce_on_join` is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Transport`] if the re-announcement cannot be sent.
    pub async fn handle(&mut self, event: ServerEvent) -> Result<ChatEvent, ChatError> {
        let event = self.session.handle(event).await;
        if self.announce_on_join && matches!(event, ChatEvent::PeerJoined { .. }) {
            // The newcomer missed the announcement sent at join time.
            self.announce_key().await?;
        }
        Ok(event)
    }

    /// Waits for and classifies the next relay event.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] when the relay goes away.
    pub async fn next_event(&mut self) -> Result<ChatEvent, ChatError> {
        let event = self.recv_event().await?;
        self.handle(event).await
    }

    /// Closes the relay connection.
    pub async fn close(&self) {
        self.relay.close().await;
    }
}
