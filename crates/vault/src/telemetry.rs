//! Telemetry initialisation for the vault service.
//!
//! Structured JSON logs to stdout. `RUST_LOG` overrides the configured level.
//!
//! # Telemetry invariants
//!
//! - **No account numbers, routing numbers, ciphertext or key material** may
//!   appear in any log field.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the subscriber has already been set.
pub fn init(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise vault tracing subscriber: {e}"))
}
