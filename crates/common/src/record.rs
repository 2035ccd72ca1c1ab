//! Shapes of the payment-method blob stored on a client entity.
//!
//! The blob is the JSON text of a one-element array:
//!
//! ```text
//! [{"type":"Bank","bankName":..,"last4":..,"maskedAccount":..,"enc":{..}}]
//! ```
//!
//! `enc` comes in two generations. The current one nests each ciphertext with
//! its nonce and carries an explicit version:
//!
//! ```text
//! {"account":{"data":..,"iv":..},"routing":{"data":..,"iv":..},"algo":"AES-GCM-256/shared","v":2}
//! ```
//!
//! The legacy one is flat and untagged, and was only ever written with the
//! shared key:
//!
//! ```text
//! {"account":..,"accountIV":..,"routing":..,"routingIV":..}
//! ```

use serde::{Deserialize, Deserializer, Serialize};

/// Value of the `type` discriminator for bank payment methods.
pub const BANK_KIND: &str = "Bank";

/// Version number written into every current-generation envelope.
pub const ENVELOPE_VERSION: u32 = 2;

/// One authenticated ciphertext together with its nonce, both base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherField {
    /// `base64(ciphertext || tag)`.
    pub data: String,
    /// `base64(nonce)`; decodes to 12 bytes.
    pub iv: String,
}

/// Which key protected a current-generation envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// Key derived from the configured shared passphrase.
    #[serde(rename = "AES-GCM-256/shared")]
    Shared,
    /// Key derived from the device-local ephemeral secret.
    #[serde(rename = "AES-GCM-256/ephemeral")]
    Ephemeral,
    /// A label this version does not know; recovery ignores the label anyway.
    #[serde(other)]
    Unrecognised,
}

/// Current-generation envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeV2 {
    pub account: CipherField,
    pub routing: CipherField,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_algo"
    )]
    pub algo: Option<KeyAlgorithm>,
    #[serde(default = "envelope_version", deserialize_with = "lenient_version")]
    pub v: u32,
}

fn envelope_version() -> u32 {
    ENVELOPE_VERSION
}

// The envelope is recognised by its cipher fields alone; odd tags must not
// push it into `Unknown`.
fn lenient_algo<'de, D>(d: D) -> Result<Option<KeyAlgorithm>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(d)? {
        serde_json::Value::Null => None,
        other => Some(serde_json::from_value(other).unwrap_or(KeyAlgorithm::Unrecognised)),
    })
}

fn lenient_version<'de, D>(d: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match serde_json::Value::deserialize(d)? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(parsed.unwrap_or(ENVELOPE_VERSION))
}

/// Legacy flat envelope. Read-only: nothing writes this shape any more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeV1 {
    pub account: String,
    #[serde(rename = "accountIV")]
    pub account_iv: String,
    pub routing: String,
    #[serde(rename = "routingIV")]
    pub routing_iv: String,
}

/// The `enc` member of a record, discriminated by structure at parse time.
///
/// Variant order matters: serde tries `V2` first, then `V1`, and anything
/// else (including a missing `enc`) lands in `Unknown` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    V2(EnvelopeV2),
    V1(EnvelopeV1),
    Unknown(serde_json::Value),
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope::Unknown(serde_json::Value::Null)
    }
}

/// Coarse classification of an [`Envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeShape {
    V2,
    V1,
    Unknown,
}

impl Envelope {
    /// Classify the envelope generation.
    pub fn shape(&self) -> EnvelopeShape {
        match self {
            Envelope::V2(_) => EnvelopeShape::V2,
            Envelope::V1(_) => EnvelopeShape::V1,
            Envelope::Unknown(_) => EnvelopeShape::Unknown,
        }
    }

    /// The account and routing ciphertexts as a uniform pair.
    ///
    /// Legacy `accountIV`/`routingIV` play the role of `iv`. Returns `None`
    /// for an unknown shape.
    pub fn cipher_fields(&self) -> Option<(CipherField, CipherField)> {
        match self {
            Envelope::V2(env) => Some((env.account.clone(), env.routing.clone())),
            Envelope::V1(env) => Some((
                CipherField {
                    data: env.account.clone(),
                    iv: env.account_iv.clone(),
                },
                CipherField {
                    data: env.routing.clone(),
                    iv: env.routing_iv.clone(),
                },
            )),
            Envelope::Unknown(_) => None,
        }
    }
}

/// Display-safe bank details. Readable without any key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskedCredential {
    #[serde(default, deserialize_with = "null_as_default")]
    pub bank_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub authorized: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last4: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub routing_last2: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub masked_account: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub masked_routing: String,
}

/// Stored records written by the portal may carry `null` for any of the
/// display fields.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// One payment method entry. Only `type == "Bank"` is consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub masked: MaskedCredential,
    #[serde(default)]
    pub enc: Envelope,
}
