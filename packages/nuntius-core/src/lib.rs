//! # Nuntius Core
//!
//! The cryptographic core and client library for nuntius, a Signal-style
//! end-to-end encrypted chat system mediated by an untrusted relay.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        NUNTIUS CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │   Crypto    │  │  Protocol   │  │    Store    │  │   Session    │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Identity  │  │ - Payloads  │  │ - Identity  │  │ - Handshake  │   │
//! │  │ - X3DH      │  │ - HTTP JSON │  │ - Friends   │  │ - Ratchet    │   │
//! │  │ - Ratchet   │  │ - Base64    │  │ - Pre-keys  │  │   pump       │   │
//! │  │ - AEAD      │  │   framing   │  │ - One-times │  │ - WebSocket  │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴────────┬───────┴────────────────┘           │
//! │                                   │                                     │
//! │                            ┌──────┴──────┐                              │
//! │                            │     Api     │  HTTP client for the relay's │
//! │                            │             │  request/response endpoints  │
//! │                            └─────────────┘                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - Sessions are established with an X3DH key agreement against a signed
//!   pre-key and (normally) a single-use one-time key fetched from the relay.
//! - Messages ride a Diffie-Hellman double ratchet: every message uses a
//!   fresh key, and every direction change rotates the root key, giving
//!   forward secrecy and post-compromise security.
//! - The relay only ever sees opaque ciphertext and routing metadata. It is
//!   trusted for availability, never for confidentiality or integrity.

#![warn(missing_docs)]

pub mod api;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod session;
pub mod store;

pub use crypto::keys::{ExchangePriv, ExchangePub, IdentityPriv, IdentityPub, Signature};
pub use error::{Error, ErrorKind, Result};
