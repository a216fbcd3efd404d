//! # Error Handling
//!
//! One error type for the whole library, categorized by failure class.
//!
//! The classes matter operationally: cryptographic failures abort the current
//! operation and are never retried, malformed input maps to 400-class
//! responses on the relay, store failures map to 500-class responses, and
//! unavailability is either dropped (relay routing) or surfaced to the
//! command that started the operation.

use thiserror::Error;

/// Result type alias for nuntius operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure class of an [`Error`].
///
/// Used by the relay to pick an HTTP status and by callers that only care
/// whether retrying can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// DH on an invalid point, AEAD authentication failure, bad signature
    Crypto,
    /// Wrong key length, bad base64, unknown payload type
    MalformedInput,
    /// Database I/O or constraint violation
    Store,
    /// Peer not connected, one-time pool exhausted, transport failure
    Unavailable,
}

/// Main error type for nuntius
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Crypto
    // ========================================================================
    /// Key agreement produced a non-contributory result (low-order point)
    #[error("key agreement failed")]
    KeyAgreement,

    /// A signature did not verify
    #[error("signature verification failed")]
    BadSignature,

    /// The signed pre-key offered during a handshake did not verify
    #[error("couldn't verify prekey signature")]
    PrekeySignature,

    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD authentication or decryption failed
    #[error("decryption failed")]
    DecryptionFailed,

    /// The public identity bytes do not name a valid curve point
    #[error("invalid identity key")]
    InvalidIdentityKey,

    /// A ratchet operation was attempted before its chain existed
    #[error("ratchet chain not initialized")]
    RatchetNotReady,

    // ========================================================================
    // Malformed input
    // ========================================================================
    /// A key or signature had the wrong number of bytes
    #[error("incorrect key length: {0}")]
    IncorrectKeyLength(usize),

    /// An identity string did not start with the expected header
    #[error("identity has incorrect header")]
    IncorrectIdentityHeader,

    /// Bundle bytes were not a whole number of exchange keys
    #[error("data is not a multiple of exchange key size")]
    IncorrectBundleLength,

    /// A ciphertext was too short to contain its framing
    #[error("ciphertext is too short")]
    TruncatedCiphertext,

    /// Base64 decoding failed
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Hex decoding failed
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// JSON encoding or decoding failed (includes unknown payload types)
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Store
    // ========================================================================
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem operation failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// No identity has been generated yet
    #[error("no identity found")]
    NoIdentity,

    /// No friend is registered under the given name
    #[error("no friend named {0:?}")]
    UnknownFriend(String),

    /// The pre-key named by a handshake is not in the local store
    #[error("prekey not found in local store")]
    MissingPrekey,

    /// The one-time key named by a handshake is not in the local store
    #[error("one-time key not found in local store")]
    MissingOnetime,

    // ========================================================================
    // Unavailable
    // ========================================================================
    /// The relay reported a non-success status
    #[error("server returned {0}")]
    ServerStatus(String),

    /// HTTP transport failed
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The duplex stream failed
    #[error("stream error: {0}")]
    Stream(#[from] tokio_tungstenite::tungstenite::Error),

    /// The stream closed before the handshake completed
    #[error("stream closed during handshake")]
    HandshakeInterrupted,
}

impl Error {
    /// The broad class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::KeyAgreement
            | Error::BadSignature
            | Error::PrekeySignature
            | Error::EncryptionFailed
            | Error::DecryptionFailed
            | Error::InvalidIdentityKey
            | Error::RatchetNotReady => ErrorKind::Crypto,

            Error::IncorrectKeyLength(_)
            | Error::IncorrectIdentityHeader
            | Error::IncorrectBundleLength
            | Error::TruncatedCiphertext
            | Error::Base64(_)
            | Error::Hex(_)
            | Error::Json(_) => ErrorKind::MalformedInput,

            Error::Database(_)
            | Error::Io(_)
            | Error::NoIdentity
            | Error::UnknownFriend(_)
            | Error::MissingPrekey
            | Error::MissingOnetime => ErrorKind::Store,

            Error::ServerStatus(_)
            | Error::Http(_)
            | Error::Stream(_)
            | Error::HandshakeInterrupted => ErrorKind::Unavailable,
        }
    }
}
