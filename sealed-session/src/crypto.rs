//! Authenticated encryption of session payloads.
//!
//! Wire layout before base64 (standard alphabet, padded):
//!
//! ```text
//! [ HMAC-SHA256 (32 bytes, only with a signing key) ][ nonce ][ ciphertext ‖ tag ]
//! ```
//!
//! The AEAD associated data is supplied per call; the store passes the
//! session name so a blob sealed for one name never opens under another.

use crate::error::{SessionError, SessionResult};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use chacha20poly1305::{ChaCha20Poly1305, XChaCha20Poly1305};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Length of an HMAC-SHA256 signature.
pub const SIGNATURE_LEN: usize = 32;

/// Minimum signing key length.
pub const MIN_SIGNING_KEY_LEN: usize = 32;

/// Random bytes behind every session identifier (256 bits).
pub const SESSION_ID_BYTES: usize = 32;

/// Length of an encoded session identifier.
pub const SESSION_ID_LEN: usize = 43;

/// Authentication tag length shared by every supported cipher.
const TAG_LEN: usize = 16;

/// AEAD cipher used to seal session payloads.
#[derive(Clone)]
pub enum Cipher {
    /// AES-128-GCM, 12-byte nonce
    Aes128Gcm(Box<Aes128Gcm>),
    /// AES-256-GCM, 12-byte nonce
    Aes256Gcm(Box<Aes256Gcm>),
    /// ChaCha20-Poly1305, 12-byte nonce
    ChaCha20Poly1305(Box<ChaCha20Poly1305>),
    /// XChaCha20-Poly1305, 24-byte nonce
    XChaCha20Poly1305(Box<XChaCha20Poly1305>),
}

impl Cipher {
    /// AES-GCM keyed by a 16-byte (AES-128) or 32-byte (AES-256) key.
    pub fn aes_gcm(key: &[u8]) -> SessionResult<Self> {
        match key.len() {
            16 => Ok(Self::Aes128Gcm(Box::new(
                Aes128Gcm::new_from_slice(key).map_err(|_| invalid_key("AES-128-GCM", 16))?,
            ))),
            32 => Ok(Self::Aes256Gcm(Box::new(
                Aes256Gcm::new_from_slice(key).map_err(|_| invalid_key("AES-256-GCM", 32))?,
            ))),
            n => Err(SessionError::Config(format!(
                "AES-GCM key must be 16 or 32 bytes, got {}",
                n
            ))),
        }
    }

    /// ChaCha20-Poly1305 keyed by a 32-byte key.
    pub fn chacha20_poly1305(key: &[u8]) -> SessionResult<Self> {
        let cipher = ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| invalid_key("ChaCha20-Poly1305", 32))?;
        Ok(Self::ChaCha20Poly1305(Box::new(cipher)))
    }

    /// XChaCha20-Poly1305 keyed by a 32-byte key.
    pub fn xchacha20_poly1305(key: &[u8]) -> SessionResult<Self> {
        let cipher = XChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| invalid_key("XChaCha20-Poly1305", 32))?;
        Ok(Self::XChaCha20Poly1305(Box::new(cipher)))
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Aes128Gcm(_) => "AES-128-GCM",
            Self::Aes256Gcm(_) => "AES-256-GCM",
            Self::ChaCha20Poly1305(_) => "ChaCha20-Poly1305",
            Self::XChaCha20Poly1305(_) => "XChaCha20-Poly1305",
        }
    }

    pub fn nonce_size(&self) -> usize {
        match self {
            Self::XChaCha20Poly1305(_) => 24,
            _ => 12,
        }
    }

    /// Bytes the cipher adds on top of the plaintext.
    pub fn overhead(&self) -> usize {
        TAG_LEN
    }

    fn seal(&self, nonce: &[u8], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>, aes_gcm::aead::Error> {
        let payload = Payload { msg, aad };
        match self {
            Self::Aes128Gcm(c) => c.encrypt(GenericArray::from_slice(nonce), payload),
            Self::Aes256Gcm(c) => c.encrypt(GenericArray::from_slice(nonce), payload),
            Self::ChaCha20Poly1305(c) => c.encrypt(GenericArray::from_slice(nonce), payload),
            Self::XChaCha20Poly1305(c) => c.encrypt(GenericArray::from_slice(nonce), payload),
        }
    }

    fn open(&self, nonce: &[u8], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>, aes_gcm::aead::Error> {
        let payload = Payload { msg, aad };
        match self {
            Self::Aes128Gcm(c) => c.decrypt(GenericArray::from_slice(nonce), payload),
            Self::Aes256Gcm(c) => c.decrypt(GenericArray::from_slice(nonce), payload),
            Self::ChaCha20Poly1305(c) => c.decrypt(GenericArray::from_slice(nonce), payload),
            Self::XChaCha20Poly1305(c) => c.decrypt(GenericArray::from_slice(nonce), payload),
        }
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cipher").field(&self.algorithm()).finish()
    }
}

fn invalid_key(algorithm: &str, expected: usize) -> SessionError {
    SessionError::Config(format!("{} key must be {} bytes", algorithm, expected))
}

/// Seals values into signed, encrypted text blobs and opens them again.
#[derive(Clone)]
pub struct CryptoEnvelope {
    cipher: Cipher,
    signer: Option<HmacSha256>,
}

impl CryptoEnvelope {
    /// Create an envelope from a ready cipher and an optional signing key.
    ///
    /// A signing key shorter than [`MIN_SIGNING_KEY_LEN`] is a configuration error.
    pub fn new(cipher: Cipher, signing_key: Option<&[u8]>) -> SessionResult<Self> {
        let signer = match signing_key {
            Some(key) if key.len() < MIN_SIGNING_KEY_LEN => {
                return Err(SessionError::Config(format!(
                    "signing key must be at least {} bytes",
                    MIN_SIGNING_KEY_LEN
                )));
            }
            Some(key) => Some(
                <HmacSha256 as Mac>::new_from_slice(key)
                    .map_err(|_| SessionError::Config("invalid signing key".to_string()))?,
            ),
            None => None,
        };

        Ok(Self { cipher, signer })
    }

    pub fn cipher(&self) -> &Cipher {
        &self.cipher
    }

    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    /// Smallest decoded envelope that can hold at least one plaintext byte.
    pub fn min_envelope_len(&self) -> usize {
        let signature = if self.is_signed() { SIGNATURE_LEN } else { 0 };
        signature + self.cipher.nonce_size() + self.cipher.overhead() + 1
    }

    /// Serialize `value`, seal it under a fresh nonce, sign, and base64-encode.
    pub fn encrypt_and_sign<T: Serialize + ?Sized>(&self, value: &T, aad: &[u8]) -> SessionResult<String> {
        let plaintext =
            serde_json::to_vec(value).map_err(|e| SessionError::Serialization(e.to_string()))?;

        let mut nonce = vec![0u8; self.cipher.nonce_size()];
        rand::rng().fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .seal(&nonce, &plaintext, aad)
            .map_err(|_| SessionError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(SIGNATURE_LEN + nonce.len() + sealed.len());
        if let Some(signer) = &self.signer {
            let mut mac = signer.clone();
            mac.update(&nonce);
            mac.update(&sealed);
            out.extend_from_slice(&mac.finalize().into_bytes());
        }
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);

        Ok(STANDARD.encode(out))
    }

    /// Decode, verify, open and deserialize a blob produced by
    /// [`encrypt_and_sign`](Self::encrypt_and_sign) with the same `aad`.
    pub fn decrypt_and_verify<T: DeserializeOwned>(&self, text: &str, aad: &[u8]) -> SessionResult<T> {
        let decoded = STANDARD
            .decode(text)
            .map_err(|_| SessionError::InvalidData)?;

        if decoded.len() < self.min_envelope_len() {
            return Err(SessionError::InvalidData);
        }

        let body = match &self.signer {
            Some(signer) => {
                let (signature, body) = decoded.split_at(SIGNATURE_LEN);
                let mut mac = signer.clone();
                mac.update(body);
                // verify_slice compares in constant time
                mac.verify_slice(signature)
                    .map_err(|_| SessionError::SignatureInvalid)?;
                body
            }
            None => &decoded[..],
        };

        let (nonce, sealed) = body.split_at(self.cipher.nonce_size());
        let plaintext = self
            .cipher
            .open(nonce, sealed, aad)
            .map_err(|_| SessionError::EncryptionFailed)?;

        serde_json::from_slice(&plaintext).map_err(|e| SessionError::Deserialization(e.to_string()))
    }
}

impl fmt::Debug for CryptoEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoEnvelope")
            .field("cipher", &self.cipher)
            .field("signed", &self.is_signed())
            .finish()
    }
}

/// Generate a new session identifier: 256 random bits, URL-safe base64.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Check that `id` has the shape [`generate_session_id`] produces.
pub fn is_valid_session_id(id: &str) -> bool {
    id.len() == SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Generate random key material of `len` bytes.
pub fn generate_key(len: usize) -> Vec<u8> {
    let mut key = vec![0u8; len];
    rand::rng().fill_bytes(&mut key);
    key
}
