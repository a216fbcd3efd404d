//! Cryptographic primitives: keys, AEAD, KDFs, X3DH, bundles, and the
//! double ratchet.

pub mod bundle;
pub mod encryption;
pub mod exchange;
pub mod kdf;
pub mod keys;
pub mod ratchet;

pub use bundle::{generate_bundle, BundlePriv, BundlePub, BUNDLE_SIZE};
pub use encryption::MessageKey;
pub use exchange::{
    backward_exchange, forward_exchange, BackwardExchangeParams, ForwardExchangeParams,
};
pub use kdf::SharedSecret;
pub use keys::{generate_exchange, generate_identity};
pub use ratchet::DoubleRatchet;
