//! AES-256-GCM field encryption and PBKDF2 key derivation.
//!
//! This module is intentionally free of storage and HTTP dependencies.
//! It provides the low-level primitives used by the key and envelope layers.
//!
//! # Ciphertext format
//!
//! Each protected string becomes a [`CipherField`](common::record::CipherField):
//!
//! ```text
//! { "data": base64(ciphertext+tag), "iv": base64(nonce) }
//! ```
//!
//! Standard base64 alphabet with padding, so values written by the browser
//! (`btoa`) and by this crate are interchangeable.

pub mod cipher;
pub mod kdf;

pub use cipher::{decrypt_field, encrypt_field, AeadKey, CipherError, KEY_LEN, NONCE_LEN};
pub use kdf::{derive_key, PBKDF2_ITERATIONS};
