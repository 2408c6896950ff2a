//! [`KeyGenerator`]: mints, wraps, and persists new symmetric key generations.
//!
//! This is an administrative path. Persisting and reloading are not atomic
//! together: if the process dies between the two, the repository is ahead of
//! the active store until the next reload.

use common::SymmetricKeyRecord;
use thiserror::Error;
use tracing::info;

use crate::crypto::{wrap_key, KeyMaterial, WrapError, WrappingKeyPair};

use super::handle::KeyStoreHandle;
use super::repository::{KeyRepository, RepositoryError};
use super::store::KeyStoreError;

/// Errors produced while creating a key generation.
#[derive(Debug, Error)]
pub enum KeyGenError {
    /// Version `0` is reserved for "encryption disabled".
    #[error("encryption version must be greater than zero")]
    InvalidVersion,

    #[error(transparent)]
    Wrap(#[from] WrapError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The record was persisted but the active store could not be rebuilt.
    #[error("key version {version} was saved but the key store reload failed")]
    Reload {
        version: u32,
        #[source]
        source: KeyStoreError,
    },
}

/// Creates symmetric keys wrapped under one key pair.
///
/// Only the public half of the key pair is needed.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    key_pair: WrappingKeyPair,
}

impl KeyGenerator {
    pub fn new(key_pair: WrappingKeyPair) -> Self {
        Self { key_pair }
    }

    /// Fingerprint stamped on every generated record.
    pub fn fingerprint(&self) -> &str {
        self.key_pair.fingerprint()
    }

    /// Generate a random key and IV and wrap the key. The returned record has
    /// no version assigned and is not persisted.
    ///
    /// # Errors
    ///
    /// Returns [`KeyGenError::Wrap`] if wrapping fails.
    pub fn generate_key(&self) -> Result<SymmetricKeyRecord, KeyGenError> {
        let material = KeyMaterial::generate();
        let wrapped = wrap_key(material.key(), self.key_pair.public_key())?;
        Ok(SymmetricKeyRecord::unversioned(
            wrapped,
            material.iv().to_vec(),
            self.key_pair.fingerprint(),
        ))
    }

    /// Generate a key as `version`, persist it, and reload `keys` from
    /// `repository`. An existing record with the same version is replaced.
    ///
    /// # Errors
    ///
    /// - [`KeyGenError::InvalidVersion`] for version `0`.
    /// - [`KeyGenError::Repository`] if the collection cannot be created or the
    ///   record cannot be saved.
    /// - [`KeyGenError::Reload`] if the record was saved but reloading failed.
    pub fn create_new_key(
        &self,
        repository: &dyn KeyRepository,
        version: u32,
        keys: &KeyStoreHandle,
    ) -> Result<SymmetricKeyRecord, KeyGenError> {
        let record = self.persist_new_key(repository, version)?;
        keys.reload(repository)
            .map_err(|source| KeyGenError::Reload { version, source })?;
        Ok(record)
    }

    /// Generate a key as `version` and persist it without touching any key
    /// store. Used when the wrapping key pair's private half is held
    /// elsewhere, so the new version cannot be loaded locally.
    ///
    /// # Errors
    ///
    /// [`KeyGenError::InvalidVersion`] for version `0`, or
    /// [`KeyGenError::Repository`] if the record cannot be saved.
    pub fn persist_new_key(
        &self,
        repository: &dyn KeyRepository,
        version: u32,
    ) -> Result<SymmetricKeyRecord, KeyGenError> {
        if version == 0 {
            return Err(KeyGenError::InvalidVersion);
        }

        let record = self.generate_key()?.with_version(version);
        repository.create_if_missing()?;
        repository.save(&record)?;
        info!(version, fingerprint = %self.fingerprint(), "key version persisted");
        Ok(record)
    }

    /// Returns `true` if `repository` already holds a record for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyGenError::Repository`] on any failure other than a
    /// missing collection.
    pub fn version_exists(
        repository: &dyn KeyRepository,
        version: u32,
    ) -> Result<bool, KeyGenError> {
        match repository.list_all() {
            Ok(records) => Ok(records.iter().any(|r| r.version == version)),
            Err(RepositoryError::CollectionNotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
