//! # Key Management
//!
//! Identity and exchange key types.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  IdentityPub / IdentityPriv (Ed25519)                           │   │
//! │  │  ────────────────────────────────────                            │   │
//! │  │                                                                  │   │
//! │  │  Purpose:                                                       │   │
//! │  │  • The public half uniquely names a user                        │   │
//! │  │  • Signing pre-keys and one-time bundles                        │   │
//! │  │  • Converted to exchange form for X3DH                          │   │
//! │  │                                                                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  ExchangePub / ExchangePriv (X25519)                            │   │
//! │  │  ───────────────────────────────────                             │   │
//! │  │                                                                  │   │
//! │  │  Roles:                                                         │   │
//! │  │  • Signed pre-key: medium-lived, one per identity on the relay  │   │
//! │  │  • One-time key: single-use, dispensed from a bundle of 64      │   │
//! │  │  • Ephemeral: per handshake and per ratchet step                │   │
//! │  │                                                                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity → Exchange Conversion
//!
//! X3DH needs the long-term identity to participate in Diffie-Hellman, so
//! the Ed25519 identity is mapped onto Curve25519: the secret scalar is the
//! first 32 bytes of SHA-512 over the 32-byte signing seed, and the public
//! point is the Montgomery representative of the Edwards point
//! (u = (1+y)/(1-y)). Both endpoints must perform exactly this derivation or
//! the exchange loses its symmetry.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Size of a public identity key in bytes
pub const IDENTITY_PUB_SIZE: usize = 32;

/// Size of a public exchange key in bytes
pub const EXCHANGE_PUB_SIZE: usize = 32;

/// Size of an identity signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Header prefixed to the hex form of a public identity for display
const IDENTITY_PUB_HEADER: &str = "nuntiusの公開鍵";

// ============================================================================
// IDENTITY KEYS
// ============================================================================

/// The public half of an identity key.
///
/// This uniquely names a user and verifies their signatures. It travels
/// URL-safe-base64-encoded in URL paths, base64-encoded in JSON bodies, and
/// header-prefixed hex for human display.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityPub([u8; IDENTITY_PUB_SIZE]);

impl IdentityPub {
    /// Create from raw bytes, checking the length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; IDENTITY_PUB_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::IncorrectKeyLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; IDENTITY_PUB_SIZE] {
        &self.0
    }

    /// Verify a signature made by the private half of this identity.
    pub fn verify(&self, data: &[u8], sig: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&sig.0);
        key.verify(data, &sig).is_ok()
    }

    /// Map this identity onto its exchange (Montgomery) form for X3DH.
    ///
    /// Fails if the bytes do not decode to a valid Edwards point.
    pub fn to_exchange(&self) -> Result<ExchangePub> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| Error::InvalidIdentityKey)?;
        Ok(ExchangePub(key.to_montgomery().to_bytes()))
    }

    /// Parse the display form: the fixed header followed by lowercase hex.
    pub fn from_display_string(s: &str) -> Result<Self> {
        let hex_part = s
            .strip_prefix(IDENTITY_PUB_HEADER)
            .ok_or(Error::IncorrectIdentityHeader)?;
        let bytes = hex::decode(hex_part)?;
        Self::from_bytes(&bytes)
    }

    /// Decode from URL-safe base64 (as used in URL path parameters).
    pub fn from_base64(data: &str) -> Result<Self> {
        let bytes = URL_SAFE.decode(data)?;
        Self::from_bytes(&bytes)
    }

    /// Encode as URL-safe base64 (as used in URL path parameters).
    pub fn to_base64(&self) -> String {
        URL_SAFE.encode(self.0)
    }
}

impl std::fmt::Display for IdentityPub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", IDENTITY_PUB_HEADER, hex::encode(self.0))
    }
}

impl std::fmt::Debug for IdentityPub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentityPub({})", hex::encode(self.0))
    }
}

impl std::str::FromStr for IdentityPub {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_display_string(s)
    }
}

/// The private half of an identity key.
///
/// This never leaves its owner. Leaking it lets anyone impersonate the
/// identity.
pub struct IdentityPriv(SigningKey);

impl IdentityPriv {
    /// Create from the 32-byte signing seed, checking the length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::IncorrectKeyLength(bytes.len()))?;
        Ok(Self(SigningKey::from_bytes(&seed)))
    }

    /// Get the signing seed (for the local store only)
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Sign some data with this identity.
    pub fn sign(&self, data: &[u8]) -> Signature {
        Signature(self.0.sign(data).to_bytes())
    }

    /// The public half of this identity.
    pub fn public_key(&self) -> IdentityPub {
        IdentityPub(self.0.verifying_key().to_bytes())
    }

    /// Derive the exchange scalar matching [`IdentityPub::to_exchange`].
    ///
    /// The scalar is the first 32 bytes of SHA-512 over the signing seed,
    /// exactly as Ed25519 derives its own secret scalar.
    pub fn to_exchange(&self) -> ExchangePriv {
        let digest = Sha512::digest(self.0.to_bytes());
        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&digest[..32]);
        let secret = ExchangePriv(StaticSecret::from(scalar));
        scalar.zeroize();
        secret
    }
}

impl std::fmt::Debug for IdentityPriv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentityPriv([REDACTED])")
    }
}

/// Generate a new identity key-pair using the operating system RNG.
pub fn generate_identity() -> (IdentityPub, IdentityPriv) {
    let signing = SigningKey::generate(&mut OsRng);
    let public = IdentityPub(signing.verifying_key().to_bytes());
    (public, IdentityPriv(signing))
}

// ============================================================================
// SIGNATURES
// ============================================================================

/// A signature over some data with an identity key
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub(crate) [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create from raw bytes, checking the length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; SIGNATURE_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::IncorrectKeyLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

// ============================================================================
// EXCHANGE KEYS
// ============================================================================

/// The public component of an exchange key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangePub([u8; EXCHANGE_PUB_SIZE]);

impl ExchangePub {
    /// Create from raw bytes, checking the length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; EXCHANGE_PUB_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::IncorrectKeyLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Create from an exact-size array.
    pub fn from_array(bytes: [u8; EXCHANGE_PUB_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; EXCHANGE_PUB_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for ExchangePub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExchangePub({})", hex::encode(self.0))
    }
}

/// The private component of an exchange key.
///
/// The scalar is clamped at the point of use, so round-tripping through the
/// local store preserves the derived public key.
pub struct ExchangePriv(StaticSecret);

impl ExchangePriv {
    /// Create from raw scalar bytes, checking the length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::IncorrectKeyLength(bytes.len()))?;
        Ok(Self(StaticSecret::from(bytes)))
    }

    /// Get the raw scalar bytes (for the local store only)
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// The public point for this scalar.
    pub fn public_key(&self) -> ExchangePub {
        ExchangePub(X25519PublicKey::from(&self.0).to_bytes())
    }

    /// Perform Diffie-Hellman key agreement.
    ///
    /// Fails when the result is non-contributory (the peer supplied a
    /// low-order point).
    pub fn dh(&self, public: &ExchangePub) -> Result<DhSecret> {
        let shared = self
            .0
            .diffie_hellman(&X25519PublicKey::from(public.0));
        if !shared.was_contributory() {
            return Err(Error::KeyAgreement);
        }
        Ok(DhSecret(shared.to_bytes()))
    }
}

impl std::fmt::Debug for ExchangePriv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExchangePriv([REDACTED])")
    }
}

/// Generate a new exchange key-pair using the operating system RNG.
pub fn generate_exchange() -> (ExchangePub, ExchangePriv) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = ExchangePub(X25519PublicKey::from(&secret).to_bytes());
    (public, ExchangePriv(secret))
}

/// Output of a Diffie-Hellman agreement, zeroized on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DhSecret([u8; 32]);

impl DhSecret {
    /// Get the raw bytes (for key derivation)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for DhSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DhSecret([REDACTED])")
    }
}

// ============================================================================
// SERDE (bytes ride as standard base64 strings in JSON)
// ============================================================================

use base64::engine::general_purpose::STANDARD as BASE64;

impl Serialize for IdentityPub {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for IdentityPub {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = BASE64.decode(&s).map_err(serde::de::Error::custom)?;
        IdentityPub::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

impl Serialize for ExchangePub {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for ExchangePub {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = BASE64.decode(&s).map_err(serde::de::Error::custom)?;
        ExchangePub::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = BASE64.decode(&s).map_err(serde::de::Error::custom)?;
        Signature::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// TESTS
// ============================================================================
