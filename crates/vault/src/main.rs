//! `vault`: binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise structured logging.
//! 3. Open the device-local secret store and build the [`KeyManager`].
//! 4. Build the Axum router and start the HTTP server.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use vault::config::Config;
use vault::keys::{FileSecretStore, KeyManager};
use vault::lifecycle::CredentialController;
use vault::server::{self, state::AppState};
use vault::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        shared_key_configured = cfg.shared_key_configured(),
        "vault starting"
    );

    // -----------------------------------------------------------------------
    // 3. Keys
    // -----------------------------------------------------------------------
    let store = FileSecretStore::new(&cfg.secret_store_path);
    info!(path = %store.path().display(), "device secret store opened");
    let keys = KeyManager::from_config(&cfg, Arc::new(store));

    // -----------------------------------------------------------------------
    // 4. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(CredentialController::new(keys));
    let router = server::router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
