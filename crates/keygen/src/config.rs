//! Configuration loading and validation for the key generation tool.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated keygen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory of JWK key pair files. **Required.**
    pub key_pair_dir: PathBuf,

    /// Tracing log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build keygen configuration")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise keygen configuration")?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<()> {
        if self.key_pair_dir.as_os_str().is_empty() {
            anyhow::bail!("KEY_PAIR_DIR is required and must not be empty");
        }
        Ok(())
    }
}
