//! RSA identity keys: generation, DER/Base64 serialization, and the
//! OAEP unwrap of the server-issued session key.

use crate::crypto::cipher::SESSION_KEY_LEN;
use crate::crypto::CryptoError;
use crate::framing::PUBLIC_KEY_LEN;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{BigUint, Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use zeroize::Zeroizing;

const RSA_BITS: usize = 1024;
// e = 17 keeps the SPKI encoding of a 1024-bit public key at exactly the
// 160 bytes the wire field holds (a 3-byte exponent would push it to 162).
const PUBLIC_EXPONENT: u32 = 17;

/// The client's asymmetric identity: a private key and its public half.
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generates a fresh RSA-1024 keypair from the OS RNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let private =
            RsaPrivateKey::new_with_exp(&mut OsRng, RSA_BITS, &BigUint::from(PUBLIC_EXPONENT))
                .map_err(CryptoError::KeyGeneration)?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// The X.509/SPKI DER of the public key, sized for the wire field.
    pub fn public_der(&self) -> Result<[u8; PUBLIC_KEY_LEN], CryptoError> {
        let der = self
            .public
            .to_public_key_der()
            .map_err(|e| CryptoError::KeySerialization(e.to_string()))?;
        der.as_bytes()
            .try_into()
            .map_err(|_| CryptoError::PublicKeyLength(der.as_bytes().len(), PUBLIC_KEY_LEN))
    }

    /// Base64 of the PKCS#8 DER private key, as persisted in `me.info` and
    /// `priv.key`.
    pub fn to_base64(&self) -> Result<Zeroizing<String>, CryptoError> {
        let der = self
            .private
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeySerialization(e.to_string()))?;
        Ok(Zeroizing::new(BASE64.encode(der.as_bytes())))
    }

    /// Reloads a persisted private key and re-derives its public half.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let der = Zeroizing::new(
            BASE64
                .decode(encoded.trim())
                .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?,
        );
        let private = RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// OAEP-SHA1 unwrap of the wrapped session key from an AES_SEND_KEY or
    /// LOGIN_OK payload. The result must be a whole AES-256 key.
    pub fn unwrap_session_key(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let key = self
            .private
            .decrypt(Oaep::new::<Sha1>(), wrapped)
            .map_err(CryptoError::Unwrap)?;
        if key.len() != SESSION_KEY_LEN {
            return Err(CryptoError::SessionKeyLength(key.len(), SESSION_KEY_LEN));
        }
        Ok(Zeroizing::new(key))
    }
}

/// Server-side counterpart of [`KeyPair::unwrap_session_key`]: wraps a
/// session key under a client's 160-byte public key DER.
pub fn wrap_session_key(public_der: &[u8], session_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let public = RsaPublicKey::from_public_key_der(public_der)
        .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
    public
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), session_key)
        .map_err(CryptoError::Wrap)
}
