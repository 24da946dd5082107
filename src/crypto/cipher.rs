//! AES-256-CBC with PKCS#7 padding over a fixed all-zero IV.

use crate::crypto::CryptoError;
use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

/// Session keys are AES-256.
pub const SESSION_KEY_LEN: usize = 32;
/// AES block width; ciphertext lengths are always a multiple of this.
pub const BLOCK_LEN: usize = 16;

// The server decrypts every upload against a zero IV. Do not randomize.
const ZERO_IV: [u8; BLOCK_LEN] = [0u8; BLOCK_LEN];

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Encrypts `plaintext`, always emitting at least one padding block:
/// the output is `16 * ((len + 16) / 16)` bytes.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let enc = Aes256CbcEnc::new_from_slices(key, &ZERO_IV)
        .map_err(|_| CryptoError::SymmetricKeyLength(key.len(), SESSION_KEY_LEN))?;
    Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

pub fn decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let dec = Aes256CbcDec::new_from_slices(key, &ZERO_IV)
        .map_err(|_| CryptoError::SymmetricKeyLength(key.len(), SESSION_KEY_LEN))?;
    dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::BadCiphertext)
}
