//! Ordered plaintext recovery across key strategies.
//!
//! A record is recovered by the first [`Strategy`] under which **both** the
//! account and the routing ciphertext decrypt. A strategy that decrypts only
//! one of the two is discarded whole; results are never merged across
//! strategies. Strategies run strictly one after another, so a later (slow)
//! key derivation only happens once the earlier strategy has failed.
//!
//! Legacy v1 envelopes go through the same list. Only the shared key ever
//! wrote v1 data; the ephemeral attempt on v1 is kept for compatibility and
//! logs a warning when it actually succeeds.

use common::record::{CipherField, EnvelopeShape, KeyAlgorithm, PaymentMethodRecord};
use tracing::{debug, warn};

use crate::crypto::{decrypt_field, AeadKey};
use crate::envelope::PlaintextCredential;
use crate::keys::KeyManager;

/// One way of obtaining a key to try against a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Key derived from the configured shared passphrase.
    Shared,
    /// Key derived from this device's ephemeral secret.
    Ephemeral,
}

impl Strategy {
    /// The `algo` label written for envelopes encrypted with this strategy.
    pub fn algorithm(self) -> KeyAlgorithm {
        match self {
            Strategy::Shared => KeyAlgorithm::Shared,
            Strategy::Ephemeral => KeyAlgorithm::Ephemeral,
        }
    }

    /// The key for this strategy, if one can be obtained.
    pub async fn key(self, keys: &KeyManager) -> Option<AeadKey> {
        match self {
            Strategy::Shared => keys.shared_key().await,
            Strategy::Ephemeral => keys.ephemeral_key().await,
        }
    }

    /// Decrypt both fields under this strategy's key.
    ///
    /// Returns `None` unless both decrypt.
    pub async fn try_decrypt(
        self,
        keys: &KeyManager,
        account: &CipherField,
        routing: &CipherField,
    ) -> Option<PlaintextCredential> {
        let key = self.key(keys).await?;
        match (decrypt_field(&key, account), decrypt_field(&key, routing)) {
            (Some(account), Some(routing)) => Some(PlaintextCredential::new(account, routing)),
            (Some(_), None) | (None, Some(_)) => {
                debug!(strategy = ?self, "partial decryption discarded");
                None
            }
            (None, None) => None,
        }
    }
}

/// Default strategy order: portable shared key first, device key second.
pub const DEFAULT_STRATEGIES: [Strategy; 2] = [Strategy::Shared, Strategy::Ephemeral];

/// Runs an ordered list of [`Strategy`] values against stored records.
#[derive(Debug, Clone)]
pub struct DecryptionCascade {
    keys: KeyManager,
    strategies: Vec<Strategy>,
}

impl DecryptionCascade {
    /// Create a cascade with [`DEFAULT_STRATEGIES`].
    pub fn new(keys: KeyManager) -> Self {
        Self::with_strategies(keys, DEFAULT_STRATEGIES.to_vec())
    }

    /// Create a cascade with an explicit strategy order.
    pub fn with_strategies(keys: KeyManager, strategies: Vec<Strategy>) -> Self {
        Self { keys, strategies }
    }

    /// The key manager the strategies draw from.
    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    /// Recover the plaintext numbers from `record`.
    ///
    /// An unknown envelope shape returns `None` without deriving any key.
    pub async fn recover(&self, record: &PaymentMethodRecord) -> Option<PlaintextCredential> {
        let shape = record.enc.shape();
        let Some((account, routing)) = record.enc.cipher_fields() else {
            debug!("unrecognised envelope; nothing to recover");
            return None;
        };

        for &strategy in &self.strategies {
            if let Some(plain) = strategy.try_decrypt(&self.keys, &account, &routing).await {
                if shape == EnvelopeShape::V1 && strategy == Strategy::Ephemeral {
                    warn!("legacy envelope recovered with device-local key");
                }
                debug!(?shape, ?strategy, "bank credential recovered");
                return Some(plain);
            }
        }

        debug!(?shape, "no strategy recovered the bank credential");
        None
    }
}
