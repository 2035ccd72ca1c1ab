//! Key derivation for bank-credential protection.
//!
//! Two independent key sources:
//!
//! 1. **Shared**: PBKDF2 over the configured passphrase and salt. Portable
//!    across devices and sessions; disabled when no passphrase is configured.
//! 2. **Ephemeral**: PBKDF2 over a 32-byte random secret generated once per
//!    device and kept in a [`SecretStore`]. Lost with the store.
//!
//! Both derivations use [`PBKDF2_ITERATIONS`](crate::crypto::PBKDF2_ITERATIONS)
//! and run on the blocking pool. Each derived key is memoised in a
//! [`KeySlot`], so a process derives each key at most once.
//!
//! # Security invariants
//!
//! - Key material, passphrases and the ephemeral secret are never logged.
//! - The ephemeral context salt differs from any shared salt, so the two key
//!   spaces never collide.

pub mod secret_store;
pub mod slot;

pub use secret_store::{FileSecretStore, MemorySecretStore, SecretStore, SecretStoreError};
pub use slot::KeySlot;

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::crypto::{cipher::fill_random, derive_key, AeadKey};

/// Local-storage key holding the base64 ephemeral secret.
pub const EPHEMERAL_SECRET_KEY: &str = "portal.bankDetails.ephemeralSecret";

/// Fixed PBKDF2 salt for the ephemeral key.
pub const EPHEMERAL_KEY_SALT: &str = "portal.bankDetails.ephemeral.v1";

/// Byte length of a freshly generated ephemeral secret.
pub const EPHEMERAL_SECRET_LEN: usize = 32;

/// Errors produced by the key layer.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The platform's random source or derivation worker is unavailable.
    #[error("cryptographic provider unavailable")]
    ProviderUnavailable,

    /// The key source is not configured or its storage cannot be used.
    #[error("key unavailable: {0}")]
    KeyUnavailable(&'static str),
}

/// Raw ephemeral secret bytes. Zeroed on drop, never printed.
pub struct EphemeralSecret(Vec<u8>);

impl EphemeralSecret {
    /// The secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for EphemeralSecret {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for EphemeralSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EphemeralSecret([REDACTED])")
    }
}

struct SharedSource {
    passphrase: String,
    salt: String,
}

/// Derives and caches the shared and ephemeral keys.
///
/// Cheap to clone; clones share the key caches and the secret store.
#[derive(Clone)]
pub struct KeyManager {
    shared: Option<Arc<SharedSource>>,
    secrets: Arc<dyn SecretStore>,
    shared_slot: KeySlot,
    ephemeral_slot: KeySlot,
}

impl KeyManager {
    /// Create a key manager.
    ///
    /// An empty passphrase is treated as absent. Whitespace is significant.
    pub fn new(
        shared_passphrase: Option<String>,
        shared_salt: impl Into<String>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        let shared = shared_passphrase
            .filter(|p| !p.is_empty())
            .map(|passphrase| {
                Arc::new(SharedSource {
                    passphrase,
                    salt: shared_salt.into(),
                })
            });
        Self {
            shared,
            secrets,
            shared_slot: KeySlot::new(),
            ephemeral_slot: KeySlot::new(),
        }
    }

    /// Create a key manager from the validated service configuration.
    pub fn from_config(cfg: &Config, secrets: Arc<dyn SecretStore>) -> Self {
        Self::new(
            cfg.shared_passphrase.clone(),
            cfg.shared_salt.clone(),
            secrets,
        )
    }

    /// Whether a shared passphrase is configured.
    pub fn shared_configured(&self) -> bool {
        self.shared.is_some()
    }

    /// The shared key, or `None` when no passphrase is configured or the
    /// derivation could not run.
    pub async fn shared_key(&self) -> Option<AeadKey> {
        match self.try_shared_key().await {
            Ok(key) => Some(key),
            Err(e) => {
                debug!(reason = %e, "shared key not available");
                None
            }
        }
    }

    /// The shared key with the reason it is unavailable.
    ///
    /// # Errors
    ///
    /// [`KeyError::KeyUnavailable`] without a passphrase,
    /// [`KeyError::ProviderUnavailable`] if the derivation task fails.
    pub async fn try_shared_key(&self) -> Result<AeadKey, KeyError> {
        let source = self
            .shared
            .clone()
            .ok_or(KeyError::KeyUnavailable("no shared passphrase configured"))?;
        self.shared_slot
            .get_or_try_init(|| async move {
                derive_in_background(move || {
                    derive_key(source.passphrase.as_bytes(), source.salt.as_bytes())
                })
                .await
            })
            .await
    }

    /// Read this device's ephemeral secret, generating and persisting one on
    /// first use.
    ///
    /// A cached value that is not valid base64 is replaced, since nothing can
    /// be derived from it.
    ///
    /// # Errors
    ///
    /// [`KeyError::KeyUnavailable`] if the store cannot be read or written,
    /// [`KeyError::ProviderUnavailable`] if no random bytes can be drawn.
    pub fn get_or_create_ephemeral_secret(&self) -> Result<EphemeralSecret, KeyError> {
        match self.secrets.get(EPHEMERAL_SECRET_KEY) {
            Ok(Some(encoded)) => match STANDARD.decode(encoded.trim()) {
                Ok(bytes) if !bytes.is_empty() => return Ok(EphemeralSecret(bytes)),
                _ => warn!("cached ephemeral secret is malformed; replacing it"),
            },
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "ephemeral secret store unreadable");
                return Err(KeyError::KeyUnavailable("ephemeral secret store unreadable"));
            }
        }

        let mut bytes = vec![0u8; EPHEMERAL_SECRET_LEN];
        fill_random(&mut bytes).map_err(|_| KeyError::ProviderUnavailable)?;
        let secret = EphemeralSecret(bytes);

        if let Err(e) = self
            .secrets
            .set(EPHEMERAL_SECRET_KEY, &STANDARD.encode(secret.as_bytes()))
        {
            warn!(error = %e, "failed to persist ephemeral secret");
            return Err(KeyError::KeyUnavailable("ephemeral secret store unwritable"));
        }
        info!("generated device-local ephemeral secret");
        Ok(secret)
    }

    /// Derive the ephemeral key from `secret`.
    ///
    /// The same key serves encryption and decryption.
    ///
    /// # Errors
    ///
    /// [`KeyError::ProviderUnavailable`] if the derivation task fails.
    pub async fn derive_ephemeral_key(secret: EphemeralSecret) -> Result<AeadKey, KeyError> {
        derive_in_background(move || derive_key(secret.as_bytes(), EPHEMERAL_KEY_SALT.as_bytes()))
            .await
    }

    /// The ephemeral key, or `None` when the secret store or the platform
    /// cannot provide one.
    pub async fn ephemeral_key(&self) -> Option<AeadKey> {
        match self.try_ephemeral_key().await {
            Ok(key) => Some(key),
            Err(e) => {
                debug!(reason = %e, "ephemeral key not available");
                None
            }
        }
    }

    /// The ephemeral key with the reason it is unavailable.
    ///
    /// # Errors
    ///
    /// See [`KeyManager::get_or_create_ephemeral_secret`] and
    /// [`KeyManager::derive_ephemeral_key`].
    pub async fn try_ephemeral_key(&self) -> Result<AeadKey, KeyError> {
        self.ephemeral_slot
            .get_or_try_init(|| async {
                let secret = self.get_or_create_ephemeral_secret()?;
                Self::derive_ephemeral_key(secret).await
            })
            .await
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("shared_configured", &self.shared_configured())
            .finish_non_exhaustive()
    }
}

async fn derive_in_background<F>(derive: F) -> Result<AeadKey, KeyError>
where
    F: FnOnce() -> AeadKey + Send + 'static,
{
    tokio::task::spawn_blocking(derive).await.map_err(|e| {
        warn!(error = %e, "key derivation task failed");
        KeyError::ProviderUnavailable
    })
}
