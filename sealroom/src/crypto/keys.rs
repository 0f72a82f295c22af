//! Ephemeral ECDH key pairs.
//!
//! Each session generates a fresh P-256 key pair. The public half is
//! exported as an EC JWK, the form browsers produce with WebCrypto, and
//! the shared AES key is the raw ECDH x-coordinate, matching WebCrypto's
//! `deriveKey({name: "ECDH"}, ..., {name: "AES-GCM", length: 256})`.

use p256::elliptic_curve::JwkEcKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand_core::OsRng;
use serde_json::Value;

use super::CryptoError;
use super::cipher::SharedKey;

/// A session-scoped P-256 key pair.
///
/// The secret scalar is zeroized on drop by `p256`. Nothing here is ever
/// persisted.
pub struct EphemeralKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a new key pair from the system CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// The public key.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// The public key as an EC JWK.
    #[must_use]
    pub fn public_jwk(&self) -> JwkEcKey {
        self.public.to_jwk()
    }

    /// The public key as the JSON value carried by `public-key` events.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyExportFailed`] if the JWK cannot be
    /// serialized.
    pub fn public_key_value(&self) -> Result<Value, CryptoError> {
        serde_json::to_value(self.public_jwk())
            .map_err(|e| CryptoError::KeyExportFailed(e.to_string()))
    }

    /// ECDH with `peer`, yielding the 256-bit AES-GCM key.
    #[must_use]
    pub fn derive_shared_key(&self, peer: &PublicKey) -> SharedKey {
        // `SharedSecret` zeroizes itself; the bytes are copied straight into
        // the key without an intermediate buffer.
        let shared = p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());
        SharedKey::from_secret(shared.raw_secret_bytes())
    }

    /// Short hex fingerprint of the public key, for logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.public)
    }
}

/// Imports a peer's public key from the JSON value in a `public-key` event.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidPublicKey`] if the value is not an EC JWK
/// or the point is not on P-256.
pub fn parse_public_key(value: &Value) -> Result<PublicKey, CryptoError> {
    let jwk: JwkEcKey = serde_json::from_value(value.clone())
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    PublicKey::from_jwk(&jwk).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Hex of the first 8 bytes of the compressed point's x-coordinate.
#[must_use]
pub fn fingerprint(public: &PublicKey) -> String {
    use std::fmt::Write;
    let point = public.to_encoded_point(true);
    // Skip the SEC1 tag byte.
    point.as_bytes()[1..9]
        .iter()
        .fold(String::new(), |mut output, b| {
            let _ = write!(output, "{b:02x}");
            output
        })
}
