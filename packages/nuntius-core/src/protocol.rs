//! Wire protocol types.
//!
//! Everything that crosses the relay is JSON: typed payloads on the duplex
//! stream, plus the request/response bodies of the key-distribution
//! endpoints. Byte fields ride as standard base64 strings; identities in URL
//! path parameters use the URL-safe alphabet instead (see
//! [`crate::crypto::keys::IdentityPub::to_base64`]).
//!
//! Payloads are discriminated by a `type` tag. Unknown tags MUST fail
//! decoding — the deserializer rejects them rather than defaulting.

use serde::{Deserialize, Serialize};

use crate::crypto::keys::{ExchangePub, IdentityPub, Signature};

/// A frame carried over the duplex stream between a client and the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The sender. Absent on relay-originated frames; overwritten by the
    /// relay with the authenticated connection identity on routed frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<IdentityPub>,

    /// The recipient
    pub to: IdentityPub,

    /// The typed payload
    pub payload: Payload,
}

/// The typed payloads of the session protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Initiator asks the relay for a fresh key bundle from the peer.
    QueryExchange,

    /// The relay's reply to `query_exchange`, addressed back to the
    /// initiator.
    StartExchange {
        /// The peer's signed pre-key
        prekey: ExchangePub,
        /// The peer's signature over the pre-key
        sig: Signature,
        /// A one-time key burned on dispense, when one was available
        #[serde(default, skip_serializing_if = "Option::is_none")]
        onetime: Option<ExchangePub>,
    },

    /// Initiator tells the responder which keys to use, and carries the
    /// handshake ephemeral.
    EndExchange {
        /// The signed pre-key the initiator used
        prekey: ExchangePub,
        /// The one-time key the initiator used, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        onetime: Option<ExchangePub>,
        /// The initiator's ephemeral exchange key
        ephemeral: ExchangePub,
    },

    /// An opaque ratchet ciphertext.
    Message {
        /// header ∥ AEAD blob, as produced by the double ratchet
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
}

// ── Request / response bodies ─────────────────────────────────────────────────

/// Body of `POST /prekey/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrekeyRequest {
    /// The new signed pre-key
    pub prekey: ExchangePub,
    /// The identity's signature over the pre-key bytes
    pub sig: Signature,
}

/// Response of `GET /onetime/count/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountOnetimeResponse {
    /// Number of outstanding one-time keys for the identity
    pub count: i64,
}

/// Body of `POST /onetime/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendBundleRequest {
    /// The serialized public bundle
    #[serde(with = "base64_bytes")]
    pub bundle: Vec<u8>,
    /// The identity's signature over the bundle bytes
    pub sig: Signature,
}

/// Response of `POST /session/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    /// The identity's signed pre-key
    pub prekey: ExchangePub,
    /// The signature over the pre-key
    pub sig: Signature,
    /// A one-time key, burned on dispense
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onetime: Option<ExchangePub>,
}

/// Serde helper: `Vec<u8>` as a standard base64 string.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::{generate_exchange, generate_identity};

    fn parties() -> (IdentityPub, IdentityPub) {
        let (a, _) = generate_identity();
        let (b, _) = generate_identity();
        (a, b)
    }

    #[test]
    fn test_query_exchange_serialization() {
        let (a, b) = parties();
        let msg = Message {
            from: Some(a),
            to: b,
            payload: Payload::QueryExchange,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"query_exchange\""));

        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed.payload, Payload::QueryExchange));
        assert_eq!(parsed.from, Some(a));
        assert_eq!(parsed.to, b);
    }

    #[test]
    fn test_start_exchange_round_trip() {
        let (_, b) = parties();
        let (prekey, _) = generate_exchange();
        let (_, id_priv) = generate_identity();
        let sig = id_priv.sign(prekey.as_bytes());

        let msg = Message {
            from: None,
            to: b,
            payload: Payload::StartExchange {
                prekey,
                sig,
                onetime: None,
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"start_exchange\""));
        // Absent fields stay off the wire entirely.
        assert!(!json.contains("onetime"));
        assert!(!json.contains("from"));

        let parsed: Message = serde_json::from_str(&json).unwrap();
        match parsed.payload {
            Payload::StartExchange {
                prekey: p,
                sig: s,
                onetime,
            } => {
                assert_eq!(p.as_bytes(), prekey.as_bytes());
                assert_eq!(s.as_bytes(), sig.as_bytes());
                assert!(onetime.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_end_exchange_round_trip() {
        let (a, b) = parties();
        let (prekey, _) = generate_exchange();
        let (onetime, _) = generate_exchange();
        let (ephemeral, _) = generate_exchange();

        let msg = Message {
            from: Some(a),
            to: b,
            payload: Payload::EndExchange {
                prekey,
                onetime: Some(onetime),
                ephemeral,
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"end_exchange\""));

        let parsed: Message = serde_json::from_str(&json).unwrap();
        match parsed.payload {
            Payload::EndExchange {
                onetime: Some(o), ..
            } => assert_eq!(o.as_bytes(), onetime.as_bytes()),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_message_payload_round_trip() {
        let (a, b) = parties();
        let msg = Message {
            from: Some(a),
            to: b,
            payload: Payload::Message {
                data: vec![1, 2, 3, 255],
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"message\""));

        let parsed: Message = serde_json::from_str(&json).unwrap();
        match parsed.payload {
            Payload::Message { data } => assert_eq!(data, vec![1, 2, 3, 255]),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_unknown_payload_type_rejected() {
        let (a, _) = parties();
        let id_json = serde_json::to_string(&a).unwrap();
        let json = format!("{{\"to\":{id_json},\"payload\":{{\"type\":\"steal_keys\"}}}}");
        assert!(serde_json::from_str::<Message>(&json).is_err());
    }

    #[test]
    fn test_prekey_request_round_trip() {
        let (prekey, _) = generate_exchange();
        let (_, id_priv) = generate_identity();
        let request = PrekeyRequest {
            prekey,
            sig: id_priv.sign(prekey.as_bytes()),
        };
        let json = serde_json::to_string(&request).unwrap();
        let parsed: PrekeyRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.prekey.as_bytes(), prekey.as_bytes());
    }

    #[test]
    fn test_session_response_omits_missing_onetime() {
        let (prekey, _) = generate_exchange();
        let (_, id_priv) = generate_identity();
        let response = SessionResponse {
            prekey,
            sig: id_priv.sign(prekey.as_bytes()),
            onetime: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("onetime"));
    }

    #[test]
    fn test_count_response_shape() {
        let parsed: CountOnetimeResponse = serde_json::from_str("{\"count\":64}").unwrap();
        assert_eq!(parsed.count, 64);
    }
}
