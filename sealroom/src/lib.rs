//! `SealRoom` client library.
//!
//! End-to-end encrypted room chat: ephemeral P-256 key agreement and
//! AES-256-GCM messages carried by a relay that only ever sees ciphertext.

pub mod chat;
pub mod config;
pub mod crypto;
pub mod transport;
