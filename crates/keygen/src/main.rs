//! `fieldcrypt-keygen`: administrative key rotation entry point.
//!
//! ```text
//! fieldcrypt-keygen [--force] <NEW_VERSION> <WRAPPING_KEY_FINGERPRINT> <STORE_CONNECTION_INFO>
//! ```
//!
//! Sequence:
//! 1. Parse arguments (usage errors exit with status 2).
//! 2. Load and validate [`Config`](config::Config) from environment variables.
//! 3. Initialise structured JSON logging.
//! 4. Resolve the wrapping key pair, mint the key, persist it, and reload.
//!    With only the public half available the reload is skipped.
//!
//! Any failure prints a one-line `error:` diagnosis and exits with status 1.
//! Nothing is retried.

mod cli;
mod config;
mod telemetry;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use common::SymmetricKeyRecord;
use fieldcrypt::keys::{FileKeyRepository, JwkDirectoryProvider, KeyPairProvider};
use fieldcrypt::{KeyGenerator, KeyStoreHandle};
use tracing::{info, warn};

use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match setup().and_then(|cfg| run(&cli, &cfg)) {
        Ok(record) => {
            println!(
                "created key version {} wrapped with {}",
                record.version, record.wrapping_key_fingerprint
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn setup() -> Result<config::Config> {
    let cfg = config::Config::from_env()?;
    telemetry::init(&cfg.log_level)?;
    Ok(cfg)
}

/// Create the key version described by `cli`.
fn run(cli: &Cli, cfg: &config::Config) -> Result<SymmetricKeyRecord> {
    let provider = JwkDirectoryProvider::new(&cfg.key_pair_dir);
    let pair = provider
        .resolve_by_fingerprint(&cli.fingerprint, false)
        .with_context(|| format!("failed to read key pairs from {}", cfg.key_pair_dir.display()))?
        .with_context(|| {
            format!(
                "no key pair with fingerprint {} in {}",
                cli.fingerprint,
                cfg.key_pair_dir.display()
            )
        })?;

    let repository = FileKeyRepository::new(&cli.store);
    if !cli.force && KeyGenerator::version_exists(&repository, cli.version)? {
        anyhow::bail!(
            "key version {} already exists in {}; pass --force to replace it",
            cli.version,
            cli.store.display()
        );
    }

    let verifiable = pair.has_private_key();
    let generator = KeyGenerator::new(pair);
    if !verifiable {
        let record = generator
            .persist_new_key(&repository, cli.version)
            .with_context(|| format!("failed to create key version {}", cli.version))?;
        warn!(
            version = cli.version,
            "new key version saved but not verified: private half of the wrapping key pair is not available here"
        );
        return Ok(record);
    }

    let keys = KeyStoreHandle::new(Arc::new(provider));
    let record = generator
        .create_new_key(&repository, cli.version, &keys)
        .with_context(|| format!("failed to create key version {}", cli.version))?;
    info!(version = cli.version, "new key version verified");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use fieldcrypt::crypto::WrappingKeyPair;
    use fieldcrypt::keys::KeyRepository;

    use super::*;

    fn cli(version: u32, fingerprint: &str, store: &Path, force: bool) -> Cli {
        Cli {
            version,
            fingerprint: fingerprint.into(),
            store: store.to_path_buf(),
            force,
        }
    }

    fn cfg(dir: &Path) -> config::Config {
        config::Config {
            key_pair_dir: dir.to_path_buf(),
            log_level: "info".into(),
        }
    }

    #[test]
    fn creates_new_version() {
        let dir = tempfile::tempdir().unwrap();
        let pairs = dir.path().join("pairs");
        let store = dir.path().join("keys");
        let pair = WrappingKeyPair::generate();
        JwkDirectoryProvider::new(&pairs).install(&pair, true).unwrap();

        let record = run(&cli(1000, &pair.fingerprint().to_lowercase(), &store, false), &cfg(&pairs)).unwrap();
        assert_eq!(record.version, 1000);
        assert_eq!(record.wrapping_key_fingerprint, pair.fingerprint());
        assert_eq!(FileKeyRepository::new(&store).list_all().unwrap(), vec![record]);
    }

    #[test]
    fn public_half_is_enough_to_wrap() {
        let dir = tempfile::tempdir().unwrap();
        let pair = WrappingKeyPair::generate();
        JwkDirectoryProvider::new(dir.path()).install(&pair, false).unwrap();
        let store = dir.path().join("keys");

        let record = run(&cli(3, pair.fingerprint(), &store, false), &cfg(dir.path())).unwrap();
        assert_eq!(FileKeyRepository::new(&store).list_all().unwrap(), vec![record]);
    }

    #[test]
    fn refuses_existing_version_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let pair = WrappingKeyPair::generate();
        JwkDirectoryProvider::new(dir.path()).install(&pair, true).unwrap();
        let store = dir.path().join("keys");

        let first = run(&cli(7, pair.fingerprint(), &store, false), &cfg(dir.path())).unwrap();
        let err = run(&cli(7, pair.fingerprint(), &store, false), &cfg(dir.path())).unwrap_err();
        assert!(err.to_string().contains("--force"));

        let replaced = run(&cli(7, pair.fingerprint(), &store, true), &cfg(dir.path())).unwrap();
        assert_ne!(first.wrapped_key, replaced.wrapped_key);
        assert_eq!(FileKeyRepository::new(&store).list_all().unwrap(), vec![replaced]);
    }

    #[test]
    fn unknown_fingerprint_fails() {
        let dir = tempfile::tempdir().unwrap();
        JwkDirectoryProvider::new(dir.path())
            .install(&WrappingKeyPair::generate(), true)
            .unwrap();
        let err = run(&cli(1, "00FF", &dir.path().join("keys"), false), &cfg(dir.path())).unwrap_err();
        assert!(format!("{err:#}").contains("no key pair with fingerprint 00FF"));
    }
}
