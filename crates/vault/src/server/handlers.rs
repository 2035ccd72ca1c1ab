//! Axum request handlers for all service endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{
    protocol::{
        DecodeRequest, DecodeResponse, EncodeRequest, EncodeResponse, ErrorResponse,
        HealthResponse,
    },
    ServiceError,
};
use tracing::warn;

use super::state::AppState;
use crate::envelope::{BankMetadata, PlaintextCredential};
use crate::lifecycle::LifecycleError;

/// `POST /payment-method/encode`: build the stored value for a save.
///
/// Responds with `paymentMethod: null` when the numbers are blank, meaning
/// the stored credential must be cleared.
pub async fn encode(State(state): State<AppState>, Json(req): Json<EncodeRequest>) -> Response {
    let plain = PlaintextCredential::new(req.account_number, req.routing_number);
    let metadata = BankMetadata {
        bank_name: req.bank_name,
        address: req.address,
        authorized: req.authorized,
    };

    match state.controller.encode_for_storage(&plain, &metadata).await {
        Ok(payment_method) => {
            (StatusCode::OK, Json(EncodeResponse { payment_method })).into_response()
        }
        Err(LifecycleError::NoKeyAvailable) => {
            error_response(ServiceError::SecureStorageUnavailable)
        }
        Err(e @ LifecycleError::Serialise(_)) => {
            warn!(error = %e, "payment method serialisation failed");
            error_response(ServiceError::Internal("could not encode payment method".into()))
        }
    }
}

/// `POST /payment-method/decode`: masked fields plus best-effort plaintext.
///
/// Never fails for unreadable records: they decode to nulls.
pub async fn decode(State(state): State<AppState>, Json(req): Json<DecodeRequest>) -> Response {
    let decoded = state
        .controller
        .decode_for_edit(req.payment_method.as_deref());
    let plain = decoded.recovery.resolve().await;

    let (account_number, routing_number) = match plain {
        Some(p) => (Some(p.account_number.clone()), Some(p.routing_number.clone())),
        None => (None, None),
    };
    let body = DecodeResponse {
        masked: decoded.masked,
        account_number,
        routing_number,
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// `GET /health`: liveness check.
pub async fn health(State(state): State<AppState>) -> Response {
    let body = HealthResponse {
        status: "ok".into(),
        shared_key_configured: state.controller.keys().shared_configured(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

fn error_response(e: ServiceError) -> Response {
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::from(&e))).into_response()
}
