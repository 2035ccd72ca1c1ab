//! Form-facing save and load of bank credentials.
//!
//! # Lifecycle
//!
//! 1. On save, [`CredentialController::encode_for_save`] masks the numbers,
//!    encrypts them with the shared key (or, without one, the device key) and
//!    returns a current-generation record. Blank numbers clear the record.
//! 2. On load, [`CredentialController::decode_for_edit`] returns the masked
//!    fields immediately and starts plaintext recovery on a detached task.
//!    The form stays usable while [`PendingRecovery`] is outstanding.
//! 3. Dropping an unresolved [`PendingRecovery`] (the form closed) aborts
//!    the recovery task.
//!
//! Failing to obtain any key on save is the only error surfaced to users.
//! Everything else degrades to "plaintext fields left blank".

use common::record::{
    CipherField, EnvelopeV2, MaskedCredential, PaymentMethodRecord, ENVELOPE_VERSION,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cascade::{DecryptionCascade, Strategy};
use crate::crypto::{encrypt_field, AeadKey};
use crate::envelope::{
    bank_record, mask_credential, parse_payment_method_record, to_stored_value, BankMetadata,
    PlaintextCredential,
};
use crate::keys::KeyManager;

/// Errors surfaced by the credential lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Neither the shared nor the ephemeral key could be obtained.
    #[error("unable to save bank details securely, please retry")]
    NoKeyAvailable,

    /// The record could not be serialised for storage.
    #[error("failed to serialise payment method: {0}")]
    Serialise(#[from] serde_json::Error),
}

/// Result of opening a stored credential for editing.
#[derive(Debug)]
pub struct DecodedCredential {
    /// Display-safe fields; `None` when no bank record is stored.
    pub masked: Option<MaskedCredential>,
    /// Background plaintext recovery.
    pub recovery: PendingRecovery,
}

/// Handle to an in-flight recovery started by
/// [`CredentialController::decode_for_edit`].
#[derive(Debug)]
pub struct PendingRecovery {
    handle: Option<JoinHandle<Option<PlaintextCredential>>>,
}

impl PendingRecovery {
    fn nothing() -> Self {
        Self { handle: None }
    }

    /// Whether a recovery task was started.
    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    /// Wait for the recovered plaintext.
    ///
    /// `None` is the normal outcome when no strategy applies; it is not an
    /// error and nothing should be shown to the user.
    ///
    /// The handle stays owned by `self` while awaited, so cancelling this
    /// future still aborts the task.
    pub async fn resolve(mut self) -> Option<PlaintextCredential> {
        let outcome = self.handle.as_mut()?.await;
        self.handle = None;
        match outcome {
            Ok(plain) => plain,
            Err(e) => {
                warn!(error = %e, "credential recovery task failed");
                None
            }
        }
    }
}

impl Drop for PendingRecovery {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Encodes bank credentials for storage and recovers them for editing.
#[derive(Debug, Clone)]
pub struct CredentialController {
    cascade: DecryptionCascade,
}

impl CredentialController {
    /// Create a controller using the default recovery order.
    pub fn new(keys: KeyManager) -> Self {
        Self {
            cascade: DecryptionCascade::new(keys),
        }
    }

    /// The key manager used for both directions.
    pub fn keys(&self) -> &KeyManager {
        self.cascade.keys()
    }

    /// Build the record to store for `plain`.
    ///
    /// Returns `Ok(None)` when either number is blank: the stored credential
    /// must be cleared rather than replaced with ciphertext of nothing.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::NoKeyAvailable`] when no key can be obtained or the
    /// cipher cannot run.
    pub async fn encode_for_save(
        &self,
        plain: &PlaintextCredential,
        metadata: &BankMetadata,
    ) -> Result<Option<PaymentMethodRecord>, LifecycleError> {
        if plain.is_blank() {
            debug!("blank bank numbers; stored credential will be cleared");
            return Ok(None);
        }

        let masked = mask_credential(plain, metadata);
        let (strategy, key) = self.save_key().await?;

        let envelope = EnvelopeV2 {
            account: seal(&key, &plain.account_number)?,
            routing: seal(&key, &plain.routing_number)?,
            algo: Some(strategy.algorithm()),
            v: ENVELOPE_VERSION,
        };
        info!(?strategy, "bank credential encrypted for storage");
        Ok(Some(bank_record(masked, envelope)))
    }

    /// [`encode_for_save`](Self::encode_for_save) followed by serialisation
    /// into the stored string. `Ok(None)` means "clear the stored value".
    ///
    /// # Errors
    ///
    /// See [`encode_for_save`](Self::encode_for_save); also
    /// [`LifecycleError::Serialise`].
    pub async fn encode_for_storage(
        &self,
        plain: &PlaintextCredential,
        metadata: &BankMetadata,
    ) -> Result<Option<String>, LifecycleError> {
        let record = self.encode_for_save(plain, metadata).await?;
        Ok(to_stored_value(record.as_ref())?)
    }

    /// Open the stored string for editing.
    ///
    /// Masked fields are returned without touching any key. Recovery runs on
    /// a spawned task, so this must be called inside a Tokio runtime.
    pub fn decode_for_edit(&self, raw: Option<&str>) -> DecodedCredential {
        let Some(record) = parse_payment_method_record(raw) else {
            return DecodedCredential {
                masked: None,
                recovery: PendingRecovery::nothing(),
            };
        };

        let masked = record.masked.clone();
        let cascade = self.cascade.clone();
        let handle = tokio::spawn(async move { cascade.recover(&record).await });

        DecodedCredential {
            masked: Some(masked),
            recovery: PendingRecovery {
                handle: Some(handle),
            },
        }
    }

    async fn save_key(&self) -> Result<(Strategy, AeadKey), LifecycleError> {
        if let Some(key) = self.keys().shared_key().await {
            return Ok((Strategy::Shared, key));
        }
        if let Some(key) = self.keys().ephemeral_key().await {
            return Ok((Strategy::Ephemeral, key));
        }
        warn!("no encryption key available; bank credential not saved");
        Err(LifecycleError::NoKeyAvailable)
    }
}

fn seal(key: &AeadKey, value: &str) -> Result<CipherField, LifecycleError> {
    encrypt_field(key, value).map_err(|e| {
        warn!(error = %e, "bank credential encryption failed");
        LifecycleError::NoKeyAvailable
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use common::record::{Envelope, EnvelopeShape, KeyAlgorithm};

    use super::*;
    use crate::keys::secret_store::MockSecretStore;
    use crate::keys::{MemorySecretStore, SecretStore, SecretStoreError};

    const PASSPHRASE: &str = "correct horse battery staple";
    const SALT: &str = "portal-bank-details-salt";

    fn controller(passphrase: Option<&str>, store: Arc<dyn SecretStore>) -> CredentialController {
        CredentialController::new(KeyManager::new(passphrase.map(str::to_owned), SALT, store))
    }

    fn plain() -> PlaintextCredential {
        PlaintextCredential::new("0123456789", "021000021")
    }

    fn metadata() -> BankMetadata {
        BankMetadata {
            bank_name: "First Bank".into(),
            address: "1 Main St".into(),
            authorized: true,
        }
    }

    fn v2(record: &PaymentMethodRecord) -> &EnvelopeV2 {
        match &record.enc {
            Envelope::V2(env) => env,
            other => panic!("expected v2 envelope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shared_round_trip() {
        let ctl = controller(Some(PASSPHRASE), Arc::new(MemorySecretStore::new()));
        let stored = ctl.encode_for_storage(&plain(), &metadata()).await.unwrap();

        let decoded = ctl.decode_for_edit(stored.as_deref());
        assert_eq!(decoded.masked.unwrap().masked_account, "••••6789");
        assert_eq!(decoded.recovery.resolve().await, Some(plain()));
    }

    #[tokio::test]
    async fn shared_records_open_on_another_device() {
        let device_a = controller(Some(PASSPHRASE), Arc::new(MemorySecretStore::new()));
        let device_b = controller(Some(PASSPHRASE), Arc::new(MemorySecretStore::new()));
        let stored = device_a.encode_for_storage(&plain(), &metadata()).await.unwrap();
        let decoded = device_b.decode_for_edit(stored.as_deref());
        assert_eq!(decoded.recovery.resolve().await, Some(plain()));
    }

    #[tokio::test]
    async fn shared_key_is_preferred_and_labelled() {
        let ctl = controller(Some(PASSPHRASE), Arc::new(MemorySecretStore::new()));
        let record = ctl.encode_for_save(&plain(), &metadata()).await.unwrap().unwrap();
        assert_eq!(record.kind, "Bank");
        assert_eq!(v2(&record).algo, Some(KeyAlgorithm::Shared));
        assert_eq!(v2(&record).v, 2);
    }

    #[tokio::test]
    async fn ephemeral_round_trip_on_same_device() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let ctl = controller(None, store.clone());
        let record = ctl.encode_for_save(&plain(), &metadata()).await.unwrap().unwrap();
        assert_eq!(v2(&record).algo, Some(KeyAlgorithm::Ephemeral));

        // A fresh controller on the same device reuses the cached secret.
        let reopened = controller(None, store);
        let stored = to_stored_value(Some(&record)).unwrap();
        let decoded = reopened.decode_for_edit(stored.as_deref());
        assert_eq!(decoded.recovery.resolve().await, Some(plain()));
    }

    #[tokio::test]
    async fn ephemeral_records_do_not_open_on_another_device() {
        let device_a = controller(None, Arc::new(MemorySecretStore::new()));
        let device_b = controller(None, Arc::new(MemorySecretStore::new()));
        let stored = device_a.encode_for_storage(&plain(), &metadata()).await.unwrap();

        let decoded = device_b.decode_for_edit(stored.as_deref());
        assert_eq!(decoded.masked.unwrap().last4, "6789");
        assert_eq!(decoded.recovery.resolve().await, None);
    }

    #[tokio::test]
    async fn masking_is_independent_of_key_strategy() {
        let shared = controller(Some(PASSPHRASE), Arc::new(MemorySecretStore::new()));
        let ephemeral = controller(None, Arc::new(MemorySecretStore::new()));
        let a = shared.encode_for_save(&plain(), &metadata()).await.unwrap().unwrap();
        let b = ephemeral.encode_for_save(&plain(), &metadata()).await.unwrap().unwrap();
        assert_eq!(a.masked, b.masked);
        assert_eq!(a.masked.masked_account, "••••6789");
        assert_eq!(a.masked.masked_routing, "••••••21");
        assert_eq!(a.masked.bank_name, "First Bank");
    }

    #[tokio::test]
    async fn blank_numbers_clear_the_record() {
        let ctl = controller(Some(PASSPHRASE), Arc::new(MemorySecretStore::new()));
        for (account, routing) in [("", "021000021"), ("0123456789", ""), ("  ", " ")] {
            let creds = PlaintextCredential::new(account, routing);
            assert!(ctl.encode_for_save(&creds, &metadata()).await.unwrap().is_none());
            assert!(ctl.encode_for_storage(&creds, &metadata()).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn blank_numbers_need_no_key() {
        let mut store = MockSecretStore::new();
        store.expect_get().never();
        store.expect_set().never();
        let ctl = controller(None, Arc::new(store));
        let creds = PlaintextCredential::new("", "");
        assert!(ctl.encode_for_save(&creds, &metadata()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_key_at_all_is_a_hard_failure() {
        let mut store = MockSecretStore::new();
        store.expect_get().returning(|_| {
            Err(SecretStoreError::Io(std::io::Error::other("storage disabled")))
        });
        let ctl = controller(None, Arc::new(store));
        let err = ctl.encode_for_save(&plain(), &metadata()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NoKeyAvailable));
        assert_eq!(err.to_string(), "unable to save bank details securely, please retry");
    }

    #[tokio::test]
    async fn every_save_uses_fresh_nonces() {
        let ctl = controller(Some(PASSPHRASE), Arc::new(MemorySecretStore::new()));
        let a = ctl.encode_for_save(&plain(), &metadata()).await.unwrap().unwrap();
        let b = ctl.encode_for_save(&plain(), &metadata()).await.unwrap().unwrap();
        assert_ne!(v2(&a).account.iv, v2(&b).account.iv);
        assert_ne!(v2(&a).account.data, v2(&b).account.data);
        assert_ne!(v2(&a).routing.iv, v2(&b).routing.iv);
        assert_ne!(v2(&a).account.iv, v2(&a).routing.iv);
    }

    #[tokio::test]
    async fn legacy_records_open_without_changes() {
        let ctl = controller(Some(PASSPHRASE), Arc::new(MemorySecretStore::new()));
        let key = ctl.keys().shared_key().await.unwrap();
        let account = encrypt_field(&key, "0123456789").unwrap();
        let routing = encrypt_field(&key, "021000021").unwrap();
        let legacy = serde_json::json!([{
            "type": "Bank",
            "bankName": "Old Bank",
            "last4": "6789",
            "routingLast2": "21",
            "maskedAccount": "••••6789",
            "maskedRouting": "••••••21",
            "enc": {
                "account": account.data,
                "accountIV": account.iv,
                "routing": routing.data,
                "routingIV": routing.iv
            }
        }])
        .to_string();

        let decoded = ctl.decode_for_edit(Some(&legacy));
        assert_eq!(decoded.masked.unwrap().bank_name, "Old Bank");
        assert_eq!(decoded.recovery.resolve().await, Some(plain()));
    }

    #[tokio::test]
    async fn corrupted_routing_is_not_half_recovered() {
        let ctl = controller(Some(PASSPHRASE), Arc::new(MemorySecretStore::new()));
        let mut record = ctl.encode_for_save(&plain(), &metadata()).await.unwrap().unwrap();
        if let Envelope::V2(env) = &mut record.enc {
            let mut raw = STANDARD.decode(&env.routing.data).unwrap();
            let last = raw.len() - 1;
            raw[last] ^= 0x80;
            env.routing.data = STANDARD.encode(raw);
        }
        let stored = to_stored_value(Some(&record)).unwrap();
        let decoded = ctl.decode_for_edit(stored.as_deref());
        assert!(decoded.masked.is_some());
        assert_eq!(decoded.recovery.resolve().await, None);
    }

    #[tokio::test]
    async fn missing_or_malformed_records_decode_to_nothing() {
        let ctl = controller(Some(PASSPHRASE), Arc::new(MemorySecretStore::new()));
        for raw in [None, Some("not json"), Some("[]"), Some("[{\"type\":\"Card\"}]")] {
            let decoded = ctl.decode_for_edit(raw);
            assert!(decoded.masked.is_none());
            assert!(!decoded.recovery.is_started());
            assert_eq!(decoded.recovery.resolve().await, None);
        }
    }

    #[tokio::test]
    async fn unknown_envelope_keeps_masked_fields() {
        let ctl = controller(Some(PASSPHRASE), Arc::new(MemorySecretStore::new()));
        let raw = r#"[{"type":"Bank","last4":"6789","maskedAccount":"••••6789","enc":"opaque"}]"#;
        let decoded = ctl.decode_for_edit(Some(raw));
        assert_eq!(decoded.masked.unwrap().masked_account, "••••6789");
        assert_eq!(decoded.recovery.resolve().await, None);
    }

    #[tokio::test]
    async fn cancelled_resolve_aborts_recovery() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _held = tx;
            std::future::pending::<()>().await;
            None::<PlaintextCredential>
        });
        let recovery = PendingRecovery {
            handle: Some(handle),
        };

        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), recovery.resolve()).await;
        assert!(waited.is_err());
        // The aborted task drops its sender.
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn stored_records_parse_back_as_v2() {
        let ctl = controller(None, Arc::new(MemorySecretStore::new()));
        let stored = ctl.encode_for_storage(&plain(), &metadata()).await.unwrap().unwrap();
        let record = parse_payment_method_record(Some(&stored)).unwrap();
        assert_eq!(record.enc.shape(), EnvelopeShape::V2);
        assert_eq!(record.masked.routing_last2, "21");
    }
}
