//! Cryptographic layer for `SealRoom`.
//!
//! Ephemeral P-256 key pairs ([`keys`]) and the AES-256-GCM shared key
//! derived from them ([`cipher`]). [`cipher::SharedKey`] is the only place
//! plaintext is turned into ciphertext and back; everything above it sees
//! either plaintext or an [`EncryptedEnvelope`](sealroom_proto::event::EncryptedEnvelope),
//! never raw key bytes.

pub mod cipher;
pub mod keys;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The peer's public key is not a valid P-256 JWK.
    #[error("invalid peer public key: {0}")]
    InvalidPublicKey(String),

    /// The local public key could not be exported.
    #[error("public key export failed: {0}")]
    KeyExportFailed(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (malformed envelope, wrong key, or tampered data).
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// A blocking crypto task panicked or was cancelled.
    #[error("crypto task failed: {0}")]
    TaskFailed(String),
}

/// Runs a CPU-bound crypto operation on tokio's blocking pool.
///
/// Keeps key generation, ECDH and AES-GCM off the async worker threads.
pub(crate) async fn offload<T, F>(op: F) -> Result<T, CryptoError>
where
    F: FnOnce() -> Result<T, CryptoError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| CryptoError::TaskFailed(e.to_string()))?
}
