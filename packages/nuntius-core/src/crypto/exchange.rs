//! # X3DH Key Agreement
//!
//! The asynchronous key agreement that bootstraps a session. The initiator
//! combines their identity and a fresh ephemeral against the responder's
//! identity, signed pre-key, and (normally) one single-use one-time key:
//!
//! ```text
//! DH1 = DH(IK_A,  SPK_B)
//! DH2 = DH(EK_A,  IK_B)
//! DH3 = DH(EK_A,  SPK_B)
//! DH4 = DH(EK_A,  OPK_B)        — omitted when no one-time key is available
//! K   = HKDF-SHA-512(DH1 ‖ DH2 ‖ DH3 ‖ [DH4])
//! ```
//!
//! [`backward_exchange`] is the responder's mirror image; for matching key
//! material both directions produce byte-identical secrets. Identity keys
//! participate through their exchange (Montgomery) form — see
//! [`crate::crypto::keys`].

use crate::crypto::kdf::{x3dh_kdf, SharedSecret};
use crate::crypto::keys::{ExchangePriv, ExchangePub, IdentityPriv, IdentityPub};
use crate::error::Result;

/// Everything the initiator of an exchange holds.
#[derive(Debug)]
pub struct ForwardExchangeParams<'a> {
    /// The private identity key of the initiator
    pub me: &'a IdentityPriv,
    /// The private part of a fresh ephemeral exchange key
    pub ephemeral: &'a ExchangePriv,
    /// The public identity key of the recipient
    pub them: &'a IdentityPub,
    /// The recipient's signed pre-key
    pub prekey: &'a ExchangePub,
    /// The recipient's one-time key, when the relay had one to dispense
    pub onetime: Option<&'a ExchangePub>,
}

/// Derive a shared secret as the initiator of an exchange.
///
/// Fails when any Diffie-Hellman product is non-contributory or the
/// recipient identity is not a valid curve point.
pub fn forward_exchange(params: &ForwardExchangeParams<'_>) -> Result<SharedSecret> {
    let me_exchange = params.me.to_exchange();
    let them_exchange = params.them.to_exchange()?;

    let dh1 = me_exchange.dh(params.prekey)?;
    let dh2 = params.ephemeral.dh(&them_exchange)?;
    let dh3 = params.ephemeral.dh(params.prekey)?;

    let secret = match params.onetime {
        Some(onetime) => {
            let dh4 = params.ephemeral.dh(onetime)?;
            x3dh_kdf(&[&dh1, &dh2, &dh3, &dh4])
        }
        None => x3dh_kdf(&[&dh1, &dh2, &dh3]),
    };
    Ok(secret)
}

/// Everything the recipient of an exchange holds.
#[derive(Debug)]
pub struct BackwardExchangeParams<'a> {
    /// The public identity of the initiator
    pub them: &'a IdentityPub,
    /// The ephemeral key used by the initiator
    pub ephemeral: &'a ExchangePub,
    /// The private identity of the recipient
    pub me: &'a IdentityPriv,
    /// The private half of the recipient's signed pre-key
    pub prekey: &'a ExchangePriv,
    /// The private half of the one-time key the initiator named, if any
    pub onetime: Option<&'a ExchangePriv>,
}

/// Derive a shared secret as the recipient of an exchange.
///
/// The corollary to [`forward_exchange`]: the same Diffie-Hellman products
/// computed from the other side, in the same order.
pub fn backward_exchange(params: &BackwardExchangeParams<'_>) -> Result<SharedSecret> {
    let them_exchange = params.them.to_exchange()?;
    let me_exchange = params.me.to_exchange();

    let dh1 = params.prekey.dh(&them_exchange)?;
    let dh2 = me_exchange.dh(params.ephemeral)?;
    let dh3 = params.prekey.dh(params.ephemeral)?;

    let secret = match params.onetime {
        Some(onetime) => {
            let dh4 = onetime.dh(params.ephemeral)?;
            x3dh_kdf(&[&dh1, &dh2, &dh3, &dh4])
        }
        None => x3dh_kdf(&[&dh1, &dh2, &dh3]),
    };
    Ok(secret)
}
