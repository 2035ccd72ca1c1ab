//! Axum middleware layers applied to the router.
//!
//! Includes request tracing, timeout enforcement, and response compression.

use std::time::Duration;

/// Per-request timeout applied to all routes.
///
/// Bounds a cold decode, which may run two PBKDF2 derivations back to back.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
