//! One-time key bundles.
//!
//! A bundle is a fixed-size batch of single-use exchange keys: the public
//! halves are uploaded to the relay (signed as one unit by the owning
//! identity), the private halves stay in the owner's local store until a
//! handshake names one of them.

use crate::crypto::keys::{
    generate_exchange, ExchangePriv, ExchangePub, IdentityPriv, IdentityPub, Signature,
    EXCHANGE_PUB_SIZE,
};
use crate::error::{Error, Result};

/// Number of one-time keys in a bundle
pub const BUNDLE_SIZE: usize = 64;

/// A collection of single-use exchange public keys, serialized as the
/// concatenation of its points (2048 bytes for a full bundle).
#[derive(Clone, PartialEq, Eq)]
pub struct BundlePub(Vec<u8>);

impl BundlePub {
    /// Parse a bundle from bytes.
    ///
    /// Fails unless the length is a whole number of exchange keys.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() % EXCHANGE_PUB_SIZE != 0 {
            return Err(Error::IncorrectBundleLength);
        }
        Ok(Self(data))
    }

    /// The serialized concatenation of the public keys
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The exchange key at a given index.
    ///
    /// Panics if `index >= self.len()`.
    pub fn get(&self, index: usize) -> ExchangePub {
        let start = index * EXCHANGE_PUB_SIZE;
        let mut bytes = [0u8; EXCHANGE_PUB_SIZE];
        bytes.copy_from_slice(&self.0[start..start + EXCHANGE_PUB_SIZE]);
        ExchangePub::from_array(bytes)
    }

    /// The number of exchange keys in this bundle
    pub fn len(&self) -> usize {
        self.0.len() / EXCHANGE_PUB_SIZE
    }

    /// Whether the bundle holds no keys
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sign the raw concatenation with an identity key.
    pub fn sign(&self, identity: &IdentityPriv) -> Signature {
        identity.sign(&self.0)
    }

    /// Verify a signature over the raw concatenation.
    pub fn verify(&self, identity: &IdentityPub, sig: &Signature) -> bool {
        identity.verify(&self.0, sig)
    }
}

impl std::fmt::Debug for BundlePub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BundlePub(len = {})", self.len())
    }
}

/// The private counterparts to a [`BundlePub`], kept in the local store.
#[derive(Debug)]
pub struct BundlePriv(Vec<ExchangePriv>);

impl BundlePriv {
    /// The private key at a given index.
    ///
    /// Panics if `index >= self.len()`.
    pub fn get(&self, index: usize) -> &ExchangePriv {
        &self.0[index]
    }

    /// The number of private keys in this bundle
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the bundle holds no keys
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Generate a fresh bundle of [`BUNDLE_SIZE`] exchange pairs.
pub fn generate_bundle() -> (BundlePub, BundlePriv) {
    let mut public = Vec::with_capacity(BUNDLE_SIZE * EXCHANGE_PUB_SIZE);
    let mut private = Vec::with_capacity(BUNDLE_SIZE);
    for _ in 0..BUNDLE_SIZE {
        let (x_pub, x_priv) = generate_exchange();
        public.extend_from_slice(x_pub.as_bytes());
        private.push(x_priv);
    }
    (BundlePub(public), BundlePriv(private))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::generate_identity;

    #[test]
    fn test_generate_bundle_shape() {
        let (public, private) = generate_bundle();
        assert_eq!(public.len(), BUNDLE_SIZE);
        assert_eq!(private.len(), BUNDLE_SIZE);
        assert_eq!(public.as_bytes().len(), BUNDLE_SIZE * EXCHANGE_PUB_SIZE);
    }

    #[test]
    fn test_public_private_halves_match() {
        let (public, private) = generate_bundle();
        for i in 0..public.len() {
            assert_eq!(
                private.get(i).public_key().as_bytes(),
                public.get(i).as_bytes(),
            );
        }
    }

    #[test]
    fn test_from_bytes_rejects_partial_key() {
        let data = vec![0u8; EXCHANGE_PUB_SIZE * 3 + 1];
        assert!(matches!(
            BundlePub::from_bytes(data),
            Err(Error::IncorrectBundleLength)
        ));
    }

    #[test]
    fn test_from_bytes_round_trip() {
        let (public, _) = generate_bundle();
        let parsed = BundlePub::from_bytes(public.as_bytes().to_vec()).unwrap();
        assert_eq!(parsed, public);
    }

    #[test]
    fn test_sign_verify_bundle() {
        let (id_pub, id_priv) = generate_identity();
        let (public, _) = generate_bundle();

        let sig = public.sign(&id_priv);
        assert!(public.verify(&id_pub, &sig));

        let (other_pub, _) = generate_identity();
        assert!(!public.verify(&other_pub, &sig));
    }

    #[test]
    fn test_tampered_bundle_fails_verification() {
        let (id_pub, id_priv) = generate_identity();
        let (public, _) = generate_bundle();
        let sig = public.sign(&id_priv);

        let mut tampered = public.as_bytes().to_vec();
        tampered[0] ^= 1;
        let tampered = BundlePub::from_bytes(tampered).unwrap();
        assert!(!tampered.verify(&id_pub, &sig));
    }
}
