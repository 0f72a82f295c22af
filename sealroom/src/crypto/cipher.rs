//! AES-256-GCM sealing of chat messages under the ECDH-derived key.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use rand_core::OsRng;
use sealroom_proto::event::EncryptedEnvelope;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::CryptoError;

/// Nonce length for AES-GCM in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// The symmetric key both peers derive locally. Never transmitted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedKey {
    bytes: [u8; 32],
}

impl SharedKey {
    /// Copies a 32-byte ECDH secret into a new key.
    ///
    /// The bytes are written into the zeroize-on-drop storage directly, so
    /// no unprotected copy is left behind.
    pub(crate) fn from_secret(secret: &[u8]) -> Self {
        let mut key = Self { bytes: [0u8; 32] };
        key.bytes.copy_from_slice(secret);
        key
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.bytes))
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if AES-GCM rejects the
    /// input (only possible for absurdly large plaintexts).
    pub fn seal(&self, plaintext: &str, from_username: &str) -> Result<EncryptedEnvelope, CryptoError> {
        // A nonce must never repeat under one key, so it is drawn per call.
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(EncryptedEnvelope {
            iv: B64.encode(nonce),
            cipher: B64.encode(ciphertext),
            from_username: from_username.to_string(),
        })
    }

    /// Authenticates and decrypts an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] for bad base64, a nonce that
    /// is not 96 bits, a tag mismatch (tampering or wrong key), or a
    /// plaintext that is not UTF-8.
    pub fn open(&self, envelope: &EncryptedEnvelope) -> Result<String, CryptoError> {
        let iv = B64
            .decode(&envelope.iv)
            .map_err(|e| CryptoError::DecryptionFailed(format!("bad iv encoding: {e}")))?;
        if iv.len() != NONCE_LEN {
            return Err(CryptoError::DecryptionFailed(format!(
                "iv must be {NONCE_LEN} bytes, got {}",
                iv.len()
            )));
        }
        let ciphertext = B64
            .decode(&envelope.cipher)
            .map_err(|e| CryptoError::DecryptionFailed(format!("bad cipher encoding: {e}")))?;

        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed("authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::DecryptionFailed(format!("plaintext is not UTF-8: {e}")))
    }
}

impl PartialEq for SharedKey {
    fn eq(&self, other: &Self) -> bool {
        // Constant time over the key bytes.
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for SharedKey {}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}
