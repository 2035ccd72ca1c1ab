//! AES-256-GCM encryption and decryption of individual string fields.
//!
//! Every call to [`encrypt_field`] draws a fresh 96-bit nonce from the OS
//! CSPRNG. GCM nonce reuse under one key breaks both confidentiality and
//! authentication, so nonces are never derived, counted, or cached.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::record::CipherField;
use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The OS random number generator could not be read.
    #[error("secure random source unavailable")]
    RngUnavailable,

    /// AES-GCM encryption or decryption failed (wrong key or tampered data).
    #[error("aead operation failed")]
    AeadFailure,

    /// A base64 member of the cipher field does not decode, or the nonce is
    /// not [`NONCE_LEN`] bytes.
    #[error("invalid cipher field encoding")]
    InvalidEncoding,

    /// Decryption succeeded but the plaintext is not UTF-8.
    #[error("plaintext is not valid UTF-8")]
    InvalidUtf8,
}

/// A 256-bit AES key.
///
/// Cloned into call stacks when needed. The bytes are overwritten with zeroes
/// on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AeadKey(pub Box<[u8; KEY_LEN]>);

impl AeadKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Box::new(bytes))
    }
}

impl Drop for AeadKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AeadKey([REDACTED])")
    }
}

/// Fill `buf` from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CipherError::RngUnavailable`] if the platform source fails.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CipherError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|_| CipherError::RngUnavailable)
}

/// Encrypt a plaintext string field under `key`.
///
/// # Errors
///
/// Returns [`CipherError::RngUnavailable`] if no nonce can be generated, or
/// [`CipherError::AeadFailure`] on an internal AEAD error.
pub fn encrypt_field(key: &AeadKey, plaintext: &str) -> Result<CipherField, CipherError> {
    let cipher = build_cipher(key);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    fill_random(&mut nonce_bytes)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CipherError::AeadFailure)?;

    Ok(CipherField {
        data: STANDARD.encode(ciphertext),
        iv: STANDARD.encode(nonce_bytes),
    })
}

/// Decrypt a [`CipherField`] back to its original string.
///
/// Every failure mode (wrong key, tampering, malformed base64, short nonce,
/// truncated data) collapses to `None`, so callers cannot tell them apart.
pub fn decrypt_field(key: &AeadKey, field: &CipherField) -> Option<String> {
    try_decrypt(key, field).ok()
}

fn try_decrypt(key: &AeadKey, field: &CipherField) -> Result<String, CipherError> {
    let nonce_bytes = STANDARD
        .decode(field.iv.trim())
        .map_err(|_| CipherError::InvalidEncoding)?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(CipherError::InvalidEncoding);
    }
    let ciphertext = STANDARD
        .decode(field.data.trim())
        .map_err(|_| CipherError::InvalidEncoding)?;

    let plaintext = build_cipher(key)
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|_| CipherError::AeadFailure)?;

    String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
}

fn build_cipher(key: &AeadKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0[..]))
}
