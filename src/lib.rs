//! Client for an encrypted file-courier upload protocol over TCP
//!
//! Provides the framing codec, crypto envelope, and synchronous protocol
//! driver for a little-endian binary request/response protocol spoken with a
//! trusted courier server.
//!
//! A session walks a fixed sequence: identify (register a new name, or log
//! back in with the identity persisted in `me.info`), receive the AES-256
//! session key wrapped under the client's RSA public key, upload the file as
//! AES-CBC ciphertext in 1024-byte packets, then compare `cksum`-style CRCs
//! over the plaintext with the server. Each retryable stage is bounded at
//! three attempts.
//!
//! The crate is also usable from tests or tooling that need to speak the
//! server side of the protocol: the frame codec is symmetric and
//! [`crypto::keys::wrap_session_key`] is the server-side half of the key
//! exchange.
//!
//! ## Notice
//!
//! The protocol fixes the CBC IV at all zeros, so equal plaintext prefixes
//! produce equal ciphertext prefixes under the same session key. This is
//! required for wire compatibility and documented in [`crypto`].

pub mod client;
pub mod config;
pub mod crypto;
pub mod framing;
pub mod wire;

pub use client::{run, ClientError};
