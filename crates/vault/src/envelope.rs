//! Stored payment-method records: parsing, serialisation and masking.
//!
//! The envelope generation is decided once, when the stored JSON is parsed
//! into [`PaymentMethodRecord`] (see [`common::record::Envelope`]). Nothing
//! downstream looks at raw JSON again.
//!
//! # Module invariants
//!
//! - **No crypto dependencies.** Masking works from plaintext alone and never
//!   requires a key.
//! - Malformed or foreign records are "no credential", never an error that
//!   blocks the rest of the client form from loading.

use common::record::{MaskedCredential, PaymentMethodRecord, BANK_KIND};
use serde::Deserialize as _;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub use common::record::{
    CipherField, Envelope, EnvelopeShape, EnvelopeV1, EnvelopeV2, KeyAlgorithm,
};

/// Prefix shown in place of the hidden account digits.
pub const ACCOUNT_MASK: &str = "••••";

/// Prefix shown in place of the hidden routing digits.
pub const ROUTING_MASK: &str = "••••••";

/// Reasons a stored value is not a usable bank record.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The stored value is not valid JSON.
    #[error("payment method is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The stored value is not a non-empty array.
    #[error("payment method list is empty or not an array")]
    Empty,

    /// The first entry is not a bank payment method.
    #[error("first payment method is not a bank record")]
    NotBank,
}

/// Bank numbers as typed into the edit form. Lives only in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct PlaintextCredential {
    pub account_number: String,
    pub routing_number: String,
}

impl PlaintextCredential {
    pub fn new(account_number: impl Into<String>, routing_number: impl Into<String>) -> Self {
        Self {
            account_number: account_number.into(),
            routing_number: routing_number.into(),
        }
    }

    /// `true` when either number is empty after trimming, which means the
    /// stored credential must be cleared.
    pub fn is_blank(&self) -> bool {
        self.account_number.trim().is_empty() || self.routing_number.trim().is_empty()
    }
}

impl std::fmt::Debug for PlaintextCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PlaintextCredential([REDACTED])")
    }
}

/// Non-secret bank details saved next to the masked numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BankMetadata {
    pub bank_name: String,
    pub address: String,
    pub authorized: bool,
}

/// Compute the display-safe fields for `plain`.
pub fn mask_credential(plain: &PlaintextCredential, metadata: &BankMetadata) -> MaskedCredential {
    let last4 = tail(&plain.account_number, 4).to_owned();
    let routing_last2 = tail(&plain.routing_number, 2).to_owned();
    MaskedCredential {
        bank_name: metadata.bank_name.clone(),
        address: metadata.address.clone(),
        authorized: metadata.authorized,
        masked_account: format!("{ACCOUNT_MASK}{last4}"),
        masked_routing: format!("{ROUTING_MASK}{routing_last2}"),
        last4,
        routing_last2,
    }
}

/// Last `n` characters of `s`, or all of `s` when it is shorter.
fn tail(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    match s.char_indices().nth(count - n) {
        Some((start, _)) => &s[start..],
        None => s,
    }
}

/// Parse the stored payment-method string.
///
/// Returns `None` for a missing value, invalid JSON, an empty or non-array
/// value, or a first entry whose `type` is not `"Bank"`.
pub fn parse_payment_method_record(raw: Option<&str>) -> Option<PaymentMethodRecord> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match try_parse(raw) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!(reason = %e, "stored payment method ignored");
            None
        }
    }
}

fn try_parse(raw: &str) -> Result<PaymentMethodRecord, EnvelopeError> {
    let value: Value = serde_json::from_str(raw)?;
    let first = value
        .as_array()
        .and_then(|entries| entries.first())
        .ok_or(EnvelopeError::Empty)?;
    if first.get("type").and_then(Value::as_str) != Some(BANK_KIND) {
        return Err(EnvelopeError::NotBank);
    }
    Ok(PaymentMethodRecord::deserialize(first)?)
}

/// Build a fresh bank record around a current-generation envelope.
pub fn bank_record(masked: MaskedCredential, envelope: EnvelopeV2) -> PaymentMethodRecord {
    PaymentMethodRecord {
        kind: BANK_KIND.to_owned(),
        masked,
        enc: Envelope::V2(envelope),
    }
}

/// Serialise `record` into the stored one-element array.
///
/// `None` stays `None`: the caller clears the stored value.
///
/// # Errors
///
/// Returns the serialiser error; not expected for records built here.
pub fn to_stored_value(
    record: Option<&PaymentMethodRecord>,
) -> Result<Option<String>, serde_json::Error> {
    record
        .map(|r| serde_json::to_string(std::slice::from_ref(r)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain(account: &str, routing: &str) -> PlaintextCredential {
        PlaintextCredential::new(account, routing)
    }

    #[test]
    fn masks_account_and_routing() {
        let masked = mask_credential(&plain("0123456789", "021000021"), &BankMetadata::default());
        assert_eq!(masked.last4, "6789");
        assert_eq!(masked.routing_last2, "21");
        assert_eq!(masked.masked_account, "••••6789");
        assert_eq!(masked.masked_routing, "••••••21");
    }

    #[test]
    fn short_numbers_are_masked_whole() {
        let masked = mask_credential(&plain("12", "7"), &BankMetadata::default());
        assert_eq!(masked.last4, "12");
        assert_eq!(masked.masked_account, "••••12");
        assert_eq!(masked.masked_routing, "••••••7");
    }

    #[test]
    fn masking_counts_characters_not_bytes() {
        let masked = mask_credential(&plain("ÄÖÜ1234", "é9"), &BankMetadata::default());
        assert_eq!(masked.last4, "1234");
        assert_eq!(masked.routing_last2, "é9");
    }

    #[test]
    fn masking_copies_metadata() {
        let meta = BankMetadata {
            bank_name: "First Bank".into(),
            address: "1 Main St".into(),
            authorized: true,
        };
        let masked = mask_credential(&plain("0123456789", "021000021"), &meta);
        assert_eq!(masked.bank_name, "First Bank");
        assert_eq!(masked.address, "1 Main St");
        assert!(masked.authorized);
    }

    #[test]
    fn blank_detection_trims() {
        assert!(plain("", "021000021").is_blank());
        assert!(plain("0123456789", "   ").is_blank());
        assert!(!plain("0123456789", "021000021").is_blank());
    }

    #[test]
    fn plaintext_redacted_in_debug() {
        let rendered = format!("{:?}", plain("0123456789", "021000021"));
        assert!(!rendered.contains("6789"));
    }

    #[test]
    fn parses_v2_bank_record() {
        let raw = json!([{
            "type": "Bank",
            "bankName": "First Bank",
            "last4": "6789",
            "maskedAccount": "••••6789",
            "enc": {
                "account": {"data": "YQ==", "iv": "Yg=="},
                "routing": {"data": "Yw==", "iv": "ZA=="},
                "algo": "AES-GCM-256/shared",
                "v": 2
            }
        }])
        .to_string();
        let record = parse_payment_method_record(Some(&raw)).unwrap();
        assert_eq!(record.masked.bank_name, "First Bank");
        assert_eq!(record.masked.masked_account, "••••6789");
        assert_eq!(record.enc.shape(), EnvelopeShape::V2);
    }

    #[test]
    fn null_metadata_keeps_the_record() {
        let raw = json!([{
            "type": "Bank",
            "bankName": null,
            "address": null,
            "authorized": null,
            "last4": "6789",
            "maskedAccount": "••••6789",
            "enc": {
                "account": {"data": "YQ==", "iv": "Yg=="},
                "routing": {"data": "Yw==", "iv": "ZA=="},
                "algo": "AES-GCM-256/shared",
                "v": 2
            }
        }])
        .to_string();
        let record = parse_payment_method_record(Some(&raw)).unwrap();
        assert_eq!(record.masked.bank_name, "");
        assert_eq!(record.masked.address, "");
        assert!(!record.masked.authorized);
        assert_eq!(record.masked.masked_account, "••••6789");
        assert_eq!(record.enc.shape(), EnvelopeShape::V2);
    }

    #[test]
    fn parses_v1_bank_record() {
        let raw = json!([{
            "type": "Bank",
            "enc": {"account": "YQ==", "accountIV": "Yg==", "routing": "Yw==", "routingIV": "ZA=="}
        }])
        .to_string();
        let record = parse_payment_method_record(Some(&raw)).unwrap();
        assert_eq!(record.enc.shape(), EnvelopeShape::V1);
    }

    #[test]
    fn unknown_envelope_still_yields_masked_fields() {
        let raw = json!([{"type": "Bank", "last4": "6789", "enc": {"blob": "?"}}]).to_string();
        let record = parse_payment_method_record(Some(&raw)).unwrap();
        assert_eq!(record.masked.last4, "6789");
        assert_eq!(record.enc.shape(), EnvelopeShape::Unknown);
    }

    #[test]
    fn rejects_absent_and_malformed_values() {
        assert!(parse_payment_method_record(None).is_none());
        assert!(parse_payment_method_record(Some("")).is_none());
        assert!(parse_payment_method_record(Some("{not json")).is_none());
        assert!(parse_payment_method_record(Some("[]")).is_none());
        assert!(parse_payment_method_record(Some("{\"type\":\"Bank\"}")).is_none());
        assert!(parse_payment_method_record(Some("null")).is_none());
    }

    #[test]
    fn rejects_non_bank_first_entry() {
        let raw = json!([{"type": "Card", "last4": "4242"}, {"type": "Bank"}]).to_string();
        assert!(parse_payment_method_record(Some(&raw)).is_none());
    }

    #[test]
    fn stored_value_is_single_element_array() {
        let record = bank_record(
            mask_credential(&plain("0123456789", "021000021"), &BankMetadata::default()),
            EnvelopeV2 {
                account: CipherField { data: "YQ==".into(), iv: "Yg==".into() },
                routing: CipherField { data: "Yw==".into(), iv: "ZA==".into() },
                algo: Some(KeyAlgorithm::Shared),
                v: 2,
            },
        );
        let stored = to_stored_value(Some(&record)).unwrap().unwrap();
        let value: Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["type"], "Bank");
        assert_eq!(value[0]["enc"]["algo"], "AES-GCM-256/shared");
        assert_eq!(value[0]["enc"]["v"], 2);
        assert_eq!(parse_payment_method_record(Some(&stored)), Some(record));
    }

    #[test]
    fn clearing_stores_nothing() {
        assert_eq!(to_stored_value(None).unwrap(), None);
    }
}
