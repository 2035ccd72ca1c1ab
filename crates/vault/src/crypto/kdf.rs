//! PBKDF2-HMAC-SHA256 key derivation.
//!
//! Parameters are fixed by data already at rest: changing the iteration count
//! or hash makes every stored envelope unreadable.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use super::cipher::{AeadKey, KEY_LEN};

/// PBKDF2 iteration count for both the shared and the ephemeral key.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Derive a 256-bit AES key from `secret` and `salt`.
///
/// Deterministic: the same inputs always produce the same key. CPU-bound;
/// call it from a blocking context.
pub fn derive_key(secret: &[u8], salt: &[u8]) -> AeadKey {
    let mut out = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(secret, salt, PBKDF2_ITERATIONS, &mut out);
    let key = AeadKey::from_bytes(out);
    out.iter_mut().for_each(|b| *b = 0);
    key
}
