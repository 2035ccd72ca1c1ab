//! Request and response types for the vault's HTTP facade.
//!
//! Field names are camelCase to match the portal's client form.

use serde::{Deserialize, Serialize};

use crate::record::MaskedCredential;

// ---------------------------------------------------------------------------
// Encode endpoint
// ---------------------------------------------------------------------------

/// Request body for `POST /payment-method/encode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeRequest {
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub routing_number: String,
    #[serde(default)]
    pub bank_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub authorized: bool,
}

/// Successful response body for `POST /payment-method/encode`.
///
/// `payment_method` is the opaque string to store on the client entity;
/// `null` means the stored credential must be cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeResponse {
    pub payment_method: Option<String>,
}

// ---------------------------------------------------------------------------
// Decode endpoint
// ---------------------------------------------------------------------------

/// Request body for `POST /payment-method/decode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeRequest {
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// Response body for `POST /payment-method/decode`.
///
/// `masked` is present whenever a bank record exists. The plaintext numbers
/// are `null` when recovery did not succeed, which is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeResponse {
    pub masked: Option<MaskedCredential>,
    pub account_number: Option<String>,
    pub routing_number: Option<String>,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::ServiceError> for ErrorResponse {
    fn from(e: &crate::ServiceError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall service status.
    pub status: String,
    /// Whether a shared passphrase is configured (otherwise saves use the
    /// device-local key only).
    pub shared_key_configured: bool,
}
