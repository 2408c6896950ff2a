//! Configuration loading and validation for the field encryption layer.
//!
//! Values are read from environment variables. Required variables that are
//! missing or invalid produce a descriptive error.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::fields::DecryptFailurePolicy;

/// Validated field encryption configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CryptoConfig {
    /// Directory holding the symmetric key collection. **Required.**
    pub key_repository_dir: PathBuf,

    /// Directory of JWK files for the wrapping key pairs. **Required.**
    pub key_pair_dir: PathBuf,

    /// Encryption version stamped on new writes. `0` stores new writes in
    /// the clear.
    #[serde(default)]
    pub write_version: u32,

    /// `abort` or `skip_field`.
    #[serde(default)]
    pub decrypt_failure_policy: DecryptFailurePolicy,

    /// When `false` the record hooks pass values through untouched.
    #[serde(default = "default_crypto_enabled")]
    pub crypto_enabled: bool,
}

fn default_crypto_enabled() -> bool {
    true
}

impl CryptoConfig {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: CryptoConfig = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// The write version, or `None` if new writes are unencrypted.
    pub fn write_version(&self) -> Option<u32> {
        Some(self.write_version).filter(|&v| v > 0)
    }

    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.key_repository_dir, "KEY_REPOSITORY_DIR")?;
        ensure_non_empty(&self.key_pair_dir, "KEY_PAIR_DIR")?;
        Ok(())
    }
}

fn ensure_non_empty(value: &std::path::Path, name: &str) -> Result<()> {
    if value.as_os_str().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
