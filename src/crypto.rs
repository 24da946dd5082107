//! The two-layer cryptographic envelope around an upload, plus the
//! plaintext integrity check.
//!
//! A fresh RSA-1024 keypair identifies the client; the server delivers the
//! 32-byte AES session key wrapped under RSAES-OAEP (SHA-1). File bytes are
//! encrypted with AES-256-CBC and PKCS#7 padding under that session key.
//! Integrity is reconciled out-of-band from the ciphertext: both sides run
//! the UNIX `cksum` CRC over the plaintext and compare.
//!
//! The CBC IV is all zeros on every message, as the server requires. Under a
//! reused session key this leaks equality of plaintext block prefixes; it is
//! wire-compatible behavior, not a recommendation.

pub mod cipher;
pub mod cksum;
pub mod keys;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("RSA key generation failed: {0}")]
    KeyGeneration(rsa::errors::Error),
    #[error("Key serialization failed: {0}")]
    KeySerialization(String),
    #[error("Invalid key encoding: {0}")]
    KeyEncoding(String),
    #[error("Public key DER is {0:#x} bytes, expected {1:#x}")]
    PublicKeyLength(usize, usize),
    #[error("Session key wrap failed: {0}")]
    Wrap(rsa::errors::Error),
    #[error("Session key unwrap failed: {0}")]
    Unwrap(rsa::errors::Error),
    #[error("Unwrapped session key is {0:#x} bytes, expected {1:#x}")]
    SessionKeyLength(usize, usize),
    #[error("Symmetric key is {0:#x} bytes, expected {1:#x}")]
    SymmetricKeyLength(usize, usize),
    #[error("Ciphertext is not a whole number of cipher blocks or has bad padding")]
    BadCiphertext,
}
