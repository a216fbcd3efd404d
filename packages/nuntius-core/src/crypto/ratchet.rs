//! # Double Ratchet
//!
//! The Diffie-Hellman double ratchet that carries a session after X3DH.
//!
//! ## State Machine
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        DOUBLE RATCHET STATE                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   sending_pub / sending_priv   our current exchange pair                │
//! │   receiving_pub                the peer's last seen exchange key        │
//! │   root_key                     advanced on every DH ratchet step        │
//! │   sending_chain                advanced on every send                   │
//! │   receiving_chain              advanced on every receive                │
//! │                                                                         │
//! │   Encrypt:  chain step on the sending chain, prepend sending_pub        │
//! │             as a 32-byte header, AEAD with header ‖ aad as the          │
//! │             associated data.                                            │
//! │                                                                         │
//! │   Decrypt:  a header that differs from receiving_pub triggers a DH      │
//! │             ratchet step (new receiving chain, fresh sending pair,      │
//! │             new sending chain — two root advances), then a chain        │
//! │             step on the receiving chain opens the message.              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Out-of-order arrivals are not buffered: a header that advances past
//! unconsumed messages permanently loses the intermediate message keys.
//! Failures leave the ratchet untouched — every mutation is staged and only
//! committed after the AEAD opens.

use crate::crypto::encryption::MessageKey;
use crate::crypto::kdf::{kdf_chain_key, kdf_root_key, ChainKey, RootKey, SharedSecret};
use crate::crypto::keys::{generate_exchange, ExchangePriv, ExchangePub, EXCHANGE_PUB_SIZE};
use crate::error::{Error, Result};

/// The state used for the Diffie-Hellman double ratchet.
///
/// Exclusively owned by one endpoint of one session; mutates on every send
/// and on every receive that carries a new peer ratchet key.
#[derive(Debug)]
pub struct DoubleRatchet {
    /// Our current exchange public key, sent as the header of every message
    sending_pub: ExchangePub,
    /// Our current exchange private key
    sending_priv: ExchangePriv,
    /// The peer's current exchange key, absent until their first message
    receiving_pub: Option<ExchangePub>,
    /// The root key of the main ratchet
    root_key: RootKey,
    /// The chain key for the sending ratchet
    sending_chain: Option<ChainKey>,
    /// The chain key for the receiving ratchet
    receiving_chain: Option<ChainKey>,
}

impl DoubleRatchet {
    /// Build a ratchet with the information known to the initiator of an
    /// exchange.
    ///
    /// `receiving_pub` is the peer's signed pre-key. A fresh sending pair is
    /// generated and one root advance derives the first sending chain, so
    /// the initiator can encrypt immediately.
    pub fn from_initiator(secret: SharedSecret, receiving_pub: ExchangePub) -> Result<Self> {
        let (sending_pub, sending_priv) = generate_exchange();
        let root = RootKey::from(secret);
        let dh = sending_priv.dh(&receiving_pub)?;
        let (root_key, sending_chain) = kdf_root_key(&root, &dh);

        Ok(Self {
            sending_pub,
            sending_priv,
            receiving_pub: Some(receiving_pub),
            root_key,
            sending_chain: Some(sending_chain),
            receiving_chain: None,
        })
    }

    /// Build a ratchet with the information known to the receiver of an
    /// exchange.
    ///
    /// The sending pair is the receiver's signed pre-key pair and the root
    /// key is the shared secret; both chains stay empty until the
    /// initiator's first message triggers a DH ratchet step.
    pub fn from_responder(
        secret: SharedSecret,
        sending_pub: ExchangePub,
        sending_priv: ExchangePriv,
    ) -> Self {
        Self {
            sending_pub,
            sending_priv,
            receiving_pub: None,
            root_key: RootKey::from(secret),
            sending_chain: None,
            receiving_chain: None,
        }
    }

    /// Encrypt a piece of data with the current state of the ratchet.
    ///
    /// Emits `sending_pub ∥ ciphertext`; the header is authenticated by
    /// being prepended to `additional`.
    pub fn encrypt(&mut self, plaintext: &[u8], additional: &[u8]) -> Result<Vec<u8>> {
        let chain = self.sending_chain.as_ref().ok_or(Error::RatchetNotReady)?;
        let (next_chain, message_key) = kdf_chain_key(chain);

        let header = self.sending_pub;
        let ciphertext =
            message_key.encrypt(plaintext, &concat(header.as_bytes(), additional))?;

        self.sending_chain = Some(next_chain);

        let mut out = Vec::with_capacity(EXCHANGE_PUB_SIZE + ciphertext.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a blob produced by the peer's [`DoubleRatchet::encrypt`],
    /// advancing the ratchet accordingly.
    ///
    /// A header matching the current `receiving_pub` takes only the
    /// symmetric step. Any failure leaves the state exactly as it was.
    pub fn decrypt(&mut self, blob: &[u8], additional: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < EXCHANGE_PUB_SIZE {
            return Err(Error::TruncatedCiphertext);
        }
        let (header, ciphertext) = blob.split_at(EXCHANGE_PUB_SIZE);
        let header_pub = ExchangePub::from_bytes(header)?;

        let same_header = self.receiving_pub.as_ref() == Some(&header_pub);
        if same_header {
            let chain = self
                .receiving_chain
                .as_ref()
                .ok_or(Error::RatchetNotReady)?;
            let (next_chain, message_key) = kdf_chain_key(chain);
            let plaintext = message_key.decrypt(ciphertext, &concat(header, additional))?;

            self.receiving_chain = Some(next_chain);
            Ok(plaintext)
        } else {
            // DH ratchet step, staged: receiving side first, then a fresh
            // sending pair, committed only after the message opens.
            let dh_recv = self.sending_priv.dh(&header_pub)?;
            let (root_after_recv, receiving_chain) = kdf_root_key(&self.root_key, &dh_recv);

            let (new_sending_pub, new_sending_priv) = generate_exchange();
            let dh_send = new_sending_priv.dh(&header_pub)?;
            let (root_after_send, sending_chain) = kdf_root_key(&root_after_recv, &dh_send);

            let (next_receiving_chain, message_key) = kdf_chain_key(&receiving_chain);
            let plaintext = message_key.decrypt(ciphertext, &concat(header, additional))?;

            self.receiving_pub = Some(header_pub);
            self.root_key = root_after_send;
            self.receiving_chain = Some(next_receiving_chain);
            self.sending_pub = new_sending_pub;
            self.sending_priv = new_sending_priv;
            self.sending_chain = Some(sending_chain);
            Ok(plaintext)
        }
    }

    /// The current root key bytes, for state-change assertions in tests.
    #[cfg(test)]
    pub(crate) fn root_key_bytes(&self) -> [u8; 32] {
        *self.root_key.as_bytes()
    }
}

fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::SHARED_SECRET_SIZE;
    use crate::crypto::keys::generate_exchange;

    /// A connected (initiator, responder) ratchet pair over a fresh secret.
    fn ratchet_pair() -> (DoubleRatchet, DoubleRatchet) {
        let secret = [77u8; SHARED_SECRET_SIZE];
        let (prekey_pub, prekey_priv) = generate_exchange();

        let initiator = DoubleRatchet::from_initiator(
            SharedSecret::from_bytes(secret),
            prekey_pub,
        )
        .unwrap();
        let responder = DoubleRatchet::from_responder(
            SharedSecret::from_bytes(secret),
            prekey_pub,
            prekey_priv,
        );
        (initiator, responder)
    }

    #[test]
    fn test_first_message() {
        let (mut alice, mut bob) = ratchet_pair();

        let blob = alice.encrypt(b"Hello There!", b"ad").unwrap();
        let plaintext = bob.decrypt(&blob, b"ad").unwrap();
        assert_eq!(plaintext, b"Hello There!");
    }

    #[test]
    fn test_reply_and_state_rotation() {
        let (mut alice, mut bob) = ratchet_pair();
        let alice_root_before = alice.root_key_bytes();

        let blob = alice.encrypt(b"Hello There!", b"").unwrap();
        bob.decrypt(&blob, b"").unwrap();

        let reply = bob.encrypt("こんにちは".as_bytes(), b"").unwrap();
        let plaintext = alice.decrypt(&reply, b"").unwrap();
        assert_eq!(plaintext, "こんにちは".as_bytes());

        // The reply crossed a DH step on Alice's side.
        assert_ne!(alice.root_key_bytes(), alice_root_before);
    }

    #[test]
    fn test_several_messages_same_direction() {
        let (mut alice, mut bob) = ratchet_pair();

        for i in 0..5u8 {
            let blob = alice.encrypt(&[i, i, i], b"").unwrap();
            assert_eq!(bob.decrypt(&blob, b"").unwrap(), [i, i, i]);
        }
    }

    #[test]
    fn test_alternating_directions() {
        let (mut alice, mut bob) = ratchet_pair();

        for i in 0..100u8 {
            // Pseudo-random direction: swap roles when i & 0b11 >= 2.
            let (sender, receiver) = if i & 0b11 >= 2 {
                (&mut bob, &mut alice)
            } else {
                (&mut alice, &mut bob)
            };
            let plaintext = [i, i];
            let additional = [i];
            let blob = sender.encrypt(&plaintext, &additional).unwrap();
            assert_eq!(receiver.decrypt(&blob, &additional).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_responder_cannot_send_first() {
        let (_, mut bob) = ratchet_pair();
        assert!(matches!(
            bob.encrypt(b"too early", b""),
            Err(Error::RatchetNotReady)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_rejected_state_unchanged() {
        let (mut alice, mut bob) = ratchet_pair();

        // Establish both directions first.
        let blob = alice.encrypt(b"one", b"").unwrap();
        bob.decrypt(&blob, b"").unwrap();
        let blob = bob.encrypt(b"two", b"").unwrap();
        alice.decrypt(&blob, b"").unwrap();

        let root_before = bob.root_key_bytes();
        let mut tampered = alice.encrypt(b"three", b"").unwrap();
        let last = tampered.len() - 1;
        tampered[last] ^= 1;

        assert!(bob.decrypt(&tampered, b"").is_err());
        assert_eq!(bob.root_key_bytes(), root_before);

        // The untampered original still decrypts afterwards.
        tampered[last] ^= 1;
        assert_eq!(bob.decrypt(&tampered, b"").unwrap(), b"three");
    }

    #[test]
    fn test_tampered_additional_rejected() {
        let (mut alice, mut bob) = ratchet_pair();
        let blob = alice.encrypt(b"payload", b"good").unwrap();
        assert!(bob.decrypt(&blob, b"evil").is_err());
        assert_eq!(bob.decrypt(&blob, b"good").unwrap(), b"payload");
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let (_, mut bob) = ratchet_pair();
        assert!(matches!(
            bob.decrypt(&[0u8; EXCHANGE_PUB_SIZE - 1], b""),
            Err(Error::TruncatedCiphertext)
        ));
    }
}
