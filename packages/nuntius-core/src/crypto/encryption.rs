//! # Encryption Module
//!
//! AES-256-GCM authenticated encryption for message payloads.
//!
//! ## Blob Layout
//!
//! ```text
//! ┌──────────────┬────────────────────────────┬──────────────┐
//! │ nonce (12 B) │ ciphertext (= |plaintext|) │  tag (16 B)  │
//! └──────────────┴────────────────────────────┴──────────────┘
//! ```
//!
//! Nonces are drawn fresh from the OS RNG for every encryption. That is only
//! safe because the ratchet uses each message key exactly once — nonce
//! uniqueness per key is the caller's obligation, and the ratchet discharges
//! it by construction.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of a message key in bytes (256 bits)
pub const MESSAGE_KEY_SIZE: usize = 32;

/// A single-use key for encrypting one message.
///
/// Zeroized on drop. Produced by the chain-key KDF; must never be reused.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MessageKey([u8; MESSAGE_KEY_SIZE]);

impl MessageKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; MESSAGE_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; MESSAGE_KEY_SIZE] {
        &self.0
    }

    /// Encrypt a plaintext, authenticating `additional` alongside it.
    ///
    /// Returns `nonce ∥ ciphertext ∥ tag`.
    pub fn encrypt(&self, plaintext: &[u8], additional: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0));

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: additional,
                },
            )
            .map_err(|_| Error::EncryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Open a blob produced by [`MessageKey::encrypt`].
    ///
    /// Fails on truncated input or any authentication mismatch, including a
    /// changed `additional`.
    pub fn decrypt(&self, blob: &[u8], additional: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < NONCE_SIZE {
            return Err(Error::TruncatedCiphertext);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0));
        cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: additional,
                },
            )
            .map_err(|_| Error::DecryptionFailed)
    }
}

impl std::fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> MessageKey {
        MessageKey::from_bytes([byte; MESSAGE_KEY_SIZE])
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let k = key(1);
        let blob = k.encrypt(b"Hello There!", b"additional").unwrap();
        assert_eq!(blob.len(), NONCE_SIZE + 12 + TAG_SIZE);

        let plaintext = k.decrypt(&blob, b"additional").unwrap();
        assert_eq!(plaintext, b"Hello There!");
    }

    #[test]
    fn test_decrypt_wrong_additional_fails() {
        let k = key(2);
        let blob = k.encrypt(b"secret", b"right").unwrap();
        assert!(matches!(
            k.decrypt(&blob, b"wrong"),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let blob = key(3).encrypt(b"secret", b"").unwrap();
        assert!(key(4).decrypt(&blob, b"").is_err());
    }

    #[test]
    fn test_decrypt_tampered_ciphertext_fails() {
        let k = key(5);
        let mut blob = k.encrypt(b"secret", b"").unwrap();
        for i in 0..blob.len() {
            blob[i] ^= 1;
            assert!(k.decrypt(&blob, b"").is_err(), "byte {i} flip accepted");
            blob[i] ^= 1;
        }
        // Untampered blob still opens.
        assert_eq!(k.decrypt(&blob, b"").unwrap(), b"secret");
    }

    #[test]
    fn test_decrypt_truncated_fails() {
        let k = key(6);
        assert!(matches!(
            k.decrypt(&[0u8; NONCE_SIZE - 1], b""),
            Err(Error::TruncatedCiphertext)
        ));
    }

    #[test]
    fn test_nonces_are_fresh() {
        let k = key(7);
        let a = k.encrypt(b"same", b"").unwrap();
        let b = k.encrypt(b"same", b"").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
    }
}
