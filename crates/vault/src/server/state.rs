//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::keys::{KeyManager, MemorySecretStore};
use crate::lifecycle::CredentialController;

/// Application state shared across all request handlers.
///
/// Cheaply cloneable: the controller shares its key caches and secret store.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Encodes and decodes stored bank credentials.
    pub controller: CredentialController,
}

impl AppState {
    /// Create a new [`AppState`] around `controller`.
    pub fn new(controller: CredentialController) -> Self {
        Self { controller }
    }
}

impl Default for AppState {
    /// No shared passphrase and an in-memory device store, suitable for tests.
    fn default() -> Self {
        let keys = KeyManager::new(None, "", Arc::new(MemorySecretStore::new()));
        Self::new(CredentialController::new(keys))
    }
}
