//! [`KeySlot`]: memoised storage for one derived key.

use std::{future::Future, sync::Arc};

use tokio::sync::{Mutex, RwLock};

use crate::crypto::AeadKey;

/// Thread-safe, lazily filled cache for a single derived key.
///
/// Reads take a short read lock and clone the key. Initialisation is
/// serialised by a separate async mutex so concurrent first callers run the
/// (slow) derivation once.
#[derive(Clone, Debug, Default)]
pub struct KeySlot {
    inner: Arc<RwLock<Option<AeadKey>>>,
    init: Arc<Mutex<()>>,
}

impl KeySlot {
    /// Create a new, empty [`KeySlot`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a key is currently cached.
    pub async fn is_ready(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Borrow a clone of the cached key, if any.
    pub async fn current(&self) -> Option<AeadKey> {
        self.inner.read().await.clone()
    }

    /// Return the cached key, or run `init` once to produce and cache it.
    ///
    /// A failed `init` leaves the slot empty so a later call can retry.
    pub async fn get_or_try_init<F, Fut, E>(&self, init: F) -> Result<AeadKey, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AeadKey, E>>,
    {
        if let Some(key) = self.current().await {
            return Ok(key);
        }
        let _guard = self.init.lock().await;
        if let Some(key) = self.current().await {
            return Ok(key);
        }
        let key = init().await?;
        *self.inner.write().await = Some(key.clone());
        Ok(key)
    }
}
