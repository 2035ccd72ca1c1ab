//! Configuration loading and validation for the vault service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any variable is invalid.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Salt used for the shared key when `SHARED_SALT` is not set.
pub const DEFAULT_SHARED_SALT: &str = "portal-bank-details-salt";

/// Validated vault service configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Passphrase for the portable shared key. When unset or empty, every
    /// save and recovery uses the device-local ephemeral key only.
    #[serde(default)]
    pub shared_passphrase: Option<String>,

    /// PBKDF2 salt for the shared key.
    #[serde(default = "default_shared_salt")]
    pub shared_salt: String,

    /// File holding this device's local key-value storage (the ephemeral secret).
    #[serde(default = "default_secret_store_path")]
    pub secret_store_path: String,

    /// Port the HTTP facade listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_shared_salt() -> String {
    DEFAULT_SHARED_SALT.into()
}
fn default_secret_store_path() -> String {
    ".vault/local-storage.json".into()
}
fn default_listen_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Whether a non-empty shared passphrase is configured.
    pub fn shared_key_configured(&self) -> bool {
        self.shared_passphrase
            .as_deref()
            .is_some_and(|p| !p.is_empty())
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.shared_salt, "SHARED_SALT")?;
        ensure_non_empty(&self.secret_store_path, "SECRET_STORE_PATH")?;
        if self.listen_port == 0 {
            anyhow::bail!("LISTEN_PORT must be > 0");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "shared_passphrase",
                &self.shared_passphrase.as_ref().map(|_| "[REDACTED]"),
            )
            .field("shared_salt", &self.shared_salt)
            .field("secret_store_path", &self.secret_store_path)
            .field("listen_port", &self.listen_port)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
