//! # Key Derivation Functions
//!
//! The three KDFs of the protocol. Their info strings are bit-exact parts of
//! the wire contract — changing any of them breaks interoperability.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    KEY DERIVATION HIERARCHY                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  X3DH (once per session)                                               │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  HKDF-SHA-512(ikm = DH1‖DH2‖DH3‖[DH4], salt = ∅,            │       │
//! │  │               info = "Nuntius X3DH KDF 2021-06-06")          │       │
//! │  │  → shared secret K (32 bytes) → initial root key            │       │
//! │  └─────────────────────────────┬───────────────────────────────┘       │
//! │                                │                                        │
//! │  Root ratchet (per DH step)    ▼                                        │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  HKDF-SHA-256(ikm = dh_out, salt = root,                    │       │
//! │  │               info = "Nuntius Root Key KDF 2021-06-20")      │       │
//! │  │  → root′ (32 bytes) ‖ chain (32 bytes)                       │       │
//! │  └─────────────────────────────┬───────────────────────────────┘       │
//! │                                │                                        │
//! │  Chain ratchet (per message)   ▼                                        │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  chain′  = HMAC-SHA-256(chain, 0x00)                         │       │
//! │  │  message = HMAC-SHA-256(chain, 0x01)                         │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::encryption::MessageKey;
use crate::crypto::keys::DhSecret;

/// HKDF info string for the root-key KDF (KDF_RK)
const ROOT_KDF_INFO: &[u8] = b"Nuntius Root Key KDF 2021-06-20";

/// HKDF info string for the X3DH shared-secret KDF
const X3DH_KDF_INFO: &[u8] = b"Nuntius X3DH KDF 2021-06-06";

/// Size of a root key in bytes
pub const ROOT_KEY_SIZE: usize = 32;

/// Size of a chain key in bytes
pub const CHAIN_KEY_SIZE: usize = 32;

/// Size of an X3DH shared secret in bytes
pub const SHARED_SECRET_SIZE: usize = 32;

/// The root key of the main ratchet, zeroized on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct RootKey([u8; ROOT_KEY_SIZE]);

impl RootKey {
    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; ROOT_KEY_SIZE] {
        &self.0
    }
}

impl From<SharedSecret> for RootKey {
    fn from(secret: SharedSecret) -> Self {
        // Copy, then let the shared secret zeroize itself on drop.
        Self(*secret.as_bytes())
    }
}

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RootKey([REDACTED])")
    }
}

/// A chain key for one direction of a ratchet, zeroized on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ChainKey([u8; CHAIN_KEY_SIZE]);

impl ChainKey {
    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; CHAIN_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChainKey([REDACTED])")
    }
}

/// A 32-byte secret shared by both endpoints after X3DH, zeroized on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_SIZE]);

impl SharedSecret {
    /// Create from raw bytes (tests and stores only — normally produced by
    /// [`x3dh_kdf`])
    pub fn from_bytes(bytes: [u8; SHARED_SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedSecret([REDACTED])")
    }
}

/// KDF_RK: derive a new root key and a chain key from the current root key
/// and a Diffie-Hellman output.
pub fn kdf_root_key(root: &RootKey, dh_out: &DhSecret) -> (RootKey, ChainKey) {
    let hk = Hkdf::<Sha256>::new(Some(root.as_bytes()), dh_out.as_bytes());

    let mut okm = [0u8; ROOT_KEY_SIZE + CHAIN_KEY_SIZE];
    hk.expand(ROOT_KDF_INFO, &mut okm)
        .expect("output size is valid for hkdf-sha256");

    let mut new_root = [0u8; ROOT_KEY_SIZE];
    let mut chain = [0u8; CHAIN_KEY_SIZE];
    new_root.copy_from_slice(&okm[..ROOT_KEY_SIZE]);
    chain.copy_from_slice(&okm[ROOT_KEY_SIZE..]);
    okm.zeroize();

    (RootKey(new_root), ChainKey(chain))
}

/// KDF_CK: derive the next chain key and a message key from a chain key.
///
/// The 0x00 / 0x01 domain separation is mandatory.
pub fn kdf_chain_key(chain: &ChainKey) -> (ChainKey, MessageKey) {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(chain.as_bytes()).expect("hmac accepts any key size");
    mac.update(&[0x00]);
    let next_chain: [u8; CHAIN_KEY_SIZE] = mac.finalize().into_bytes().into();

    let mut mac =
        HmacSha256::new_from_slice(chain.as_bytes()).expect("hmac accepts any key size");
    mac.update(&[0x01]);
    let message: [u8; 32] = mac.finalize().into_bytes().into();

    (ChainKey(next_chain), MessageKey::from_bytes(message))
}

/// X3DH KDF: concatenate 3 or 4 Diffie-Hellman outputs in order and derive
/// the 32-byte shared secret.
pub fn x3dh_kdf(dh_outs: &[&DhSecret]) -> SharedSecret {
    let mut ikm = Vec::with_capacity(dh_outs.len() * 32);
    for dh in dh_outs {
        ikm.extend_from_slice(dh.as_bytes());
    }

    let hk = Hkdf::<Sha512>::new(None, &ikm);
    let mut out = [0u8; SHARED_SECRET_SIZE];
    hk.expand(X3DH_KDF_INFO, &mut out)
        .expect("output size is valid for hkdf-sha512");

    ikm.zeroize();
    SharedSecret(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::generate_exchange;

    fn fresh_dh() -> DhSecret {
        let (a_pub, _) = generate_exchange();
        let (_, b_priv) = generate_exchange();
        b_priv.dh(&a_pub).unwrap()
    }

    #[test]
    fn test_root_kdf_not_identity() {
        let root = RootKey([42u8; ROOT_KEY_SIZE]);
        let (new_root, chain) = kdf_root_key(&root, &fresh_dh());

        assert_ne!(new_root.as_bytes(), root.as_bytes());
        assert_ne!(new_root.as_bytes(), chain.as_bytes());
    }

    #[test]
    fn test_chain_kdf_not_identity() {
        let chain = ChainKey([7u8; CHAIN_KEY_SIZE]);
        let (next, message) = kdf_chain_key(&chain);

        assert_ne!(next.as_bytes(), chain.as_bytes());
        assert_ne!(next.as_bytes(), message.as_bytes());
    }

    #[test]
    fn test_chain_kdf_deterministic() {
        let chain = ChainKey([9u8; CHAIN_KEY_SIZE]);
        let (next_a, msg_a) = kdf_chain_key(&chain);
        let (next_b, msg_b) = kdf_chain_key(&chain);

        assert_eq!(next_a.as_bytes(), next_b.as_bytes());
        assert_eq!(msg_a.as_bytes(), msg_b.as_bytes());
    }

    #[test]
    fn test_x3dh_kdf_depends_on_count() {
        let dh1 = fresh_dh();
        let dh2 = fresh_dh();
        let dh3 = fresh_dh();
        let dh4 = fresh_dh();

        let three = x3dh_kdf(&[&dh1, &dh2, &dh3]);
        let four = x3dh_kdf(&[&dh1, &dh2, &dh3, &dh4]);
        assert_ne!(three.as_bytes(), four.as_bytes());
    }

    #[test]
    fn test_x3dh_kdf_depends_on_order() {
        let dh1 = fresh_dh();
        let dh2 = fresh_dh();
        let dh3 = fresh_dh();

        let forward = x3dh_kdf(&[&dh1, &dh2, &dh3]);
        let shuffled = x3dh_kdf(&[&dh2, &dh1, &dh3]);
        assert_ne!(forward.as_bytes(), shuffled.as_bytes());
    }
}
