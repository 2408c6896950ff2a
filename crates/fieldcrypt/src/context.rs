//! [`FieldCrypto`]: everything an application needs to encrypt records,
//! wired together once at startup.

use std::sync::Arc;

use anyhow::{Context, Result};
use common::Entity;
use tracing::info;

use crate::config::CryptoConfig;
use crate::fields::{
    DecryptFailurePolicy, FieldCryptoEngine, FieldCryptoError, RecordSchema, SweepReport,
    VersionedRecordProtocol,
};
use crate::keys::{
    FileKeyRepository, JwkDirectoryProvider, KeyPairProvider, KeyRepository, KeyStoreError,
    KeyStoreHandle,
};

/// Shared key store handle, engine and record protocol, plus the repository
/// they load from. Cheap to clone.
#[derive(Clone)]
pub struct FieldCrypto {
    keys: KeyStoreHandle,
    engine: FieldCryptoEngine,
    protocol: VersionedRecordProtocol,
    repository: Arc<dyn KeyRepository>,
}

impl FieldCrypto {
    /// Build from environment-derived configuration, backed by a
    /// [`FileKeyRepository`] and a [`JwkDirectoryProvider`].
    ///
    /// # Errors
    ///
    /// Fails if the key store cannot be built, or if a configured write
    /// version is not available in it.
    pub fn from_config(cfg: &CryptoConfig) -> Result<Self> {
        let repository: Arc<dyn KeyRepository> =
            Arc::new(FileKeyRepository::new(&cfg.key_repository_dir));
        let provider: Arc<dyn KeyPairProvider> =
            Arc::new(JwkDirectoryProvider::new(&cfg.key_pair_dir));

        let crypto = Self::new(
            repository,
            provider,
            cfg.write_version(),
            cfg.decrypt_failure_policy,
        )
        .context("failed to initialise envelope key store")?
        .with_enabled(cfg.crypto_enabled);

        if let Some(version) = crypto.protocol.write_version() {
            if crypto.protocol.is_enabled() && !crypto.keys.has_version(version) {
                anyhow::bail!("WRITE_VERSION {version} is not available in the key store");
            }
        }
        info!(
            write_version = ?crypto.protocol.write_version(),
            enabled = crypto.protocol.is_enabled(),
            "field encryption ready"
        );
        Ok(crypto)
    }

    /// Build from explicit parts and initialise the key store from
    /// `repository`.
    ///
    /// # Errors
    ///
    /// Any error from [`KeyStoreHandle::initialize`].
    pub fn new(
        repository: Arc<dyn KeyRepository>,
        provider: Arc<dyn KeyPairProvider>,
        write_version: Option<u32>,
        policy: DecryptFailurePolicy,
    ) -> Result<Self, KeyStoreError> {
        let keys = KeyStoreHandle::new(provider);
        keys.initialize(repository.as_ref())?;
        let engine = FieldCryptoEngine::new(keys.clone()).with_policy(policy);
        let protocol = VersionedRecordProtocol::new(engine.clone(), write_version);
        Ok(Self {
            keys,
            engine,
            protocol,
            repository,
        })
    }

    /// Turn the record hooks on or off.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.protocol = self.protocol.with_enabled(enabled);
        self
    }

    pub fn keys(&self) -> &KeyStoreHandle {
        &self.keys
    }

    pub fn engine(&self) -> &FieldCryptoEngine {
        &self.engine
    }

    pub fn protocol(&self) -> &VersionedRecordProtocol {
        &self.protocol
    }

    pub fn repository(&self) -> &dyn KeyRepository {
        self.repository.as_ref()
    }

    /// Rebuild the key store from the repository, e.g. after a new key
    /// version was created out of process.
    pub fn reload(&self) -> Result<(), KeyStoreError> {
        self.keys.reload(self.repository.as_ref())
    }

    /// See [`VersionedRecordProtocol::before_persist`].
    pub fn before_persist<R: RecordSchema>(
        &self,
        entity: &mut Entity,
    ) -> Result<SweepReport, FieldCryptoError> {
        self.protocol.before_persist::<R>(entity)
    }

    /// See [`VersionedRecordProtocol::after_load`].
    pub fn after_load<R: RecordSchema>(
        &self,
        entity: &mut Entity,
    ) -> Result<SweepReport, FieldCryptoError> {
        self.protocol.after_load::<R>(entity)
    }
}

impl std::fmt::Debug for FieldCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCrypto")
            .field("keys", &self.keys)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::WrappingKeyPair;
    use crate::keys::KeyGenerator;

    fn install_keys(dir: &std::path::Path, versions: &[u32]) -> WrappingKeyPair {
        let pair = WrappingKeyPair::generate();
        let provider = JwkDirectoryProvider::new(dir.join("pairs"));
        provider.install(&pair, true).unwrap();
        let repo = FileKeyRepository::new(dir.join("keys"));
        let keys = KeyStoreHandle::new(Arc::new(provider));
        for &v in versions {
            KeyGenerator::new(pair.clone())
                .create_new_key(&repo, v, &keys)
                .unwrap();
        }
        pair
    }

    fn config(dir: &std::path::Path, write_version: u32) -> CryptoConfig {
        CryptoConfig {
            key_repository_dir: dir.join("keys"),
            key_pair_dir: dir.join("pairs"),
            write_version,
            decrypt_failure_policy: DecryptFailurePolicy::Abort,
            crypto_enabled: true,
        }
    }

    #[test]
    fn from_config_loads_file_backed_keys() {
        let dir = tempfile::tempdir().unwrap();
        install_keys(dir.path(), &[1, 2]);

        let crypto = FieldCrypto::from_config(&config(dir.path(), 2)).unwrap();
        assert!(crypto.keys().has_version(1));
        assert!(crypto.keys().has_version(2));
        assert_eq!(crypto.protocol().write_version(), Some(2));
    }

    #[test]
    fn from_config_rejects_unavailable_write_version() {
        let dir = tempfile::tempdir().unwrap();
        install_keys(dir.path(), &[1]);
        let err = FieldCrypto::from_config(&config(dir.path(), 9)).unwrap_err();
        assert!(err.to_string().contains("WRITE_VERSION 9"));
    }

    #[test]
    fn from_config_without_key_collection_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pairs")).unwrap();
        let crypto = FieldCrypto::from_config(&config(dir.path(), 0)).unwrap();
        assert!(crypto.keys().current().unwrap().is_empty());
    }

    #[test]
    fn reload_picks_up_new_versions() {
        let dir = tempfile::tempdir().unwrap();
        let pair = install_keys(dir.path(), &[1]);
        let crypto = FieldCrypto::from_config(&config(dir.path(), 1)).unwrap();

        let record = KeyGenerator::new(pair).generate_key().unwrap().with_version(2);
        crypto.repository().save(&record).unwrap();
        assert!(!crypto.keys().has_version(2));
        crypto.reload().unwrap();
        assert!(crypto.keys().has_version(2));
    }
}
