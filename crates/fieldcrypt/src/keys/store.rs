//! [`EnvelopeKeyStore`]: immutable cache of unwrapped symmetric keys by version.
//!
//! A store is built once from a [`KeyRepository`] snapshot and never mutated
//! afterwards. Rotation builds a new store and swaps it in through
//! [`KeyStoreHandle`](super::KeyStoreHandle).
//!
//! # Load policy
//!
//! For every record in the repository:
//!
//! 1. The wrapping key pair is resolved by fingerprint. A pair that cannot be
//!    found is skipped with a warning; the store serves the keys it can.
//! 2. A pair whose private half is inaccessible fails the whole load with
//!    [`KeyStoreError::PrivateKeyNotAccessible`].
//! 3. Any other failure fails the whole load with
//!    [`KeyStoreError::Initialization`].
//!
//! A repository whose collection does not exist yet yields an empty store.

use std::collections::BTreeMap;

use common::SymmetricKeyRecord;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::crypto::{
    normalize_fingerprint, unwrap_key, Decryptor, Encryptor, KeyMaterial, WrapError, NONCE_LEN,
};

use super::provider::{KeyPairProvider, ProviderError};
use super::repository::{KeyRepository, RepositoryError};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by the key store layer.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// No store has been published yet.
    #[error("key store not yet initialised")]
    NotInitialised,

    /// A key pair was found but its private half cannot be used. This is a
    /// configuration fault, not a transient absence.
    #[error("private key of key pair {fingerprint} for version {version} is not accessible")]
    PrivateKeyNotAccessible { version: u32, fingerprint: String },

    #[error("key store initialization failed: {context}")]
    Initialization {
        context: String,
        #[source]
        source: BoxError,
    },

    /// The requested version is not in the store.
    #[error("encryption version {0} not found")]
    VersionNotFound(u32),
}

impl KeyStoreError {
    fn init(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        KeyStoreError::Initialization {
            context: context.into(),
            source: source.into(),
        }
    }
}

/// One unwrapped key generation. Key bytes are zeroed on drop.
#[derive(Debug)]
pub struct UnwrappedKeyEntry {
    version: u32,
    material: KeyMaterial,
}

impl UnwrappedKeyEntry {
    pub fn version(&self) -> u32 {
        self.version
    }
}

/// Read-only map from encryption version to key material.
#[derive(Debug, Default)]
pub struct EnvelopeKeyStore {
    entries: BTreeMap<u32, UnwrappedKeyEntry>,
}

impl EnvelopeKeyStore {
    /// A store with no keys.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every record from `repository` and unwrap it with the key pair
    /// `provider` resolves for its fingerprint.
    ///
    /// # Errors
    ///
    /// See the module docs for the load policy.
    pub fn load(
        repository: &dyn KeyRepository,
        provider: &dyn KeyPairProvider,
    ) -> Result<Self, KeyStoreError> {
        let records = match repository.list_all() {
            Ok(records) => records,
            Err(RepositoryError::CollectionNotFound) => {
                info!("key collection does not exist; no keys available");
                Vec::new()
            }
            Err(e) => return Err(KeyStoreError::init("failed to list key records", e)),
        };

        let mut entries = BTreeMap::new();
        let mut skipped = 0usize;
        for record in &records {
            let Some(material) = unwrap_record(record, provider)? else {
                skipped += 1;
                continue;
            };
            let version = record.version;
            let entry = UnwrappedKeyEntry { version, material };
            if entries.insert(version, entry).is_some() {
                warn!(version, "duplicate key version in repository; last record wins");
            }
        }

        info!(
            count = entries.len(),
            skipped,
            "envelope key store built"
        );
        Ok(Self { entries })
    }

    /// A fresh single-use encryptor for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::VersionNotFound`] if `version` is not cached.
    pub fn encryptor(&self, version: u32) -> Result<Encryptor, KeyStoreError> {
        self.entry(version).map(|e| e.material.encryptor())
    }

    /// A fresh single-use decryptor for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::VersionNotFound`] if `version` is not cached.
    pub fn decryptor(&self, version: u32) -> Result<Decryptor, KeyStoreError> {
        self.entry(version).map(|e| e.material.decryptor())
    }

    pub fn has_version(&self, version: u32) -> bool {
        self.entries.contains_key(&version)
    }

    /// Cached versions in ascending order.
    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, version: u32) -> Result<&UnwrappedKeyEntry, KeyStoreError> {
        self.entries
            .get(&version)
            .ok_or(KeyStoreError::VersionNotFound(version))
    }
}

/// Unwrap one record. `Ok(None)` means its key pair is not available.
fn unwrap_record(
    record: &SymmetricKeyRecord,
    provider: &dyn KeyPairProvider,
) -> Result<Option<KeyMaterial>, KeyStoreError> {
    let version = record.version;
    validate_record(record)?;

    let fingerprint = normalize_fingerprint(&record.wrapping_key_fingerprint);
    let pair = match provider.resolve_by_fingerprint(&fingerprint, true) {
        Ok(Some(pair)) => pair,
        Ok(None) => {
            warn!(version, fingerprint = %fingerprint, "wrapping key pair not found; key version skipped");
            return Ok(None);
        }
        Err(ProviderError::PrivateKeyNotAccessible { fingerprint }) => {
            return Err(KeyStoreError::PrivateKeyNotAccessible { version, fingerprint })
        }
        Err(e) => {
            return Err(KeyStoreError::init(
                format!("failed to resolve key pair {fingerprint} for version {version}"),
                e,
            ))
        }
    };

    let raw = match unwrap_key(&record.wrapped_key, &pair) {
        Ok(raw) => raw,
        Err(WrapError::KeyPairAccess(fingerprint)) => {
            return Err(KeyStoreError::PrivateKeyNotAccessible { version, fingerprint })
        }
        Err(e) => {
            return Err(KeyStoreError::init(
                format!("failed to unwrap key version {version}"),
                e,
            ))
        }
    };

    let material = KeyMaterial::new(&raw, &record.iv)
        .map_err(|e| KeyStoreError::init(format!("invalid key material for version {version}"), e))?;
    debug!(version, fingerprint = %fingerprint, "key version unwrapped");
    Ok(Some(material))
}

fn validate_record(record: &SymmetricKeyRecord) -> Result<(), KeyStoreError> {
    let version = record.version;
    let problem = if version == 0 {
        "version must be greater than zero".to_owned()
    } else if record.iv.len() != NONCE_LEN {
        format!("IV must be {NONCE_LEN} bytes, got {}", record.iv.len())
    } else if record.wrapping_key_fingerprint.trim().is_empty() {
        "wrapping key fingerprint is empty".to_owned()
    } else {
        return Ok(());
    };
    Err(KeyStoreError::init(
        format!("invalid key record for version {version}"),
        problem,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{wrap_key, WrappingKeyPair};
    use crate::keys::provider::{InMemoryKeyPairProvider, JwkDirectoryProvider, MockKeyPairProvider};
    use crate::keys::repository::{FileKeyRepository, InMemoryKeyRepository, MockKeyRepository};

    fn minted(version: u32, pair: &WrappingKeyPair) -> SymmetricKeyRecord {
        let material = KeyMaterial::generate();
        let wrapped = wrap_key(material.key(), pair.public_key()).unwrap();
        SymmetricKeyRecord::unversioned(wrapped, material.iv().to_vec(), pair.fingerprint())
            .with_version(version)
    }

    #[test]
    fn loads_and_serves_versions() {
        let pair = WrappingKeyPair::generate();
        let repo = InMemoryKeyRepository::with_records([minted(1, &pair), minted(2, &pair)]);
        let provider = InMemoryKeyPairProvider::new().with_pair(pair);

        let store = EnvelopeKeyStore::load(&repo, &provider).unwrap();
        assert_eq!(store.versions().collect::<Vec<_>>(), vec![1, 2]);

        let ct = store.encryptor(2).unwrap().encrypt(b"payload").unwrap();
        assert_eq!(store.decryptor(2).unwrap().decrypt(&ct).unwrap(), b"payload");
        assert!(store.decryptor(1).unwrap().decrypt(&ct).is_err());
    }

    #[test]
    fn missing_version_is_not_found() {
        let store = EnvelopeKeyStore::empty();
        assert!(matches!(
            store.encryptor(7),
            Err(KeyStoreError::VersionNotFound(7))
        ));
        assert!(matches!(
            store.decryptor(7),
            Err(KeyStoreError::VersionNotFound(7))
        ));
        assert!(!store.has_version(7));
    }

    #[test]
    fn missing_collection_yields_empty_store() {
        let repo = InMemoryKeyRepository::new();
        let store = EnvelopeKeyStore::load(&repo, &InMemoryKeyPairProvider::new()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_key_pair_is_skipped() {
        let known = WrappingKeyPair::generate();
        let unknown = WrappingKeyPair::generate();
        let repo = InMemoryKeyRepository::with_records([minted(1, &unknown), minted(2, &known)]);
        let provider = InMemoryKeyPairProvider::new().with_pair(known);

        let store = EnvelopeKeyStore::load(&repo, &provider).unwrap();
        assert!(!store.has_version(1));
        assert!(store.has_version(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn public_only_pair_is_fatal() {
        let pair = WrappingKeyPair::generate();
        let repo = InMemoryKeyRepository::with_records([minted(5, &pair)]);
        let provider = InMemoryKeyPairProvider::new().with_pair(pair.public_only());

        match EnvelopeKeyStore::load(&repo, &provider) {
            Err(KeyStoreError::PrivateKeyNotAccessible { version, fingerprint }) => {
                assert_eq!(version, 5);
                assert_eq!(fingerprint, pair.fingerprint());
            }
            other => panic!("expected PrivateKeyNotAccessible, got {other:?}"),
        }
    }

    #[test]
    fn public_only_jwk_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pair = WrappingKeyPair::generate();
        let repo = FileKeyRepository::new(dir.path().join("keys"));
        repo.create_if_missing().unwrap();
        repo.save(&minted(1000, &pair)).unwrap();
        let provider = JwkDirectoryProvider::new(dir.path().join("pairs"));
        provider.install(&pair, false).unwrap();

        assert!(matches!(
            EnvelopeKeyStore::load(&repo, &provider),
            Err(KeyStoreError::PrivateKeyNotAccessible { version: 1000, .. })
        ));
    }

    #[test]
    fn provider_returning_public_half_is_fatal() {
        let pair = WrappingKeyPair::generate();
        let repo = InMemoryKeyRepository::with_records([minted(3, &pair)]);
        let public = pair.public_only();
        let mut provider = MockKeyPairProvider::new();
        provider
            .expect_resolve_by_fingerprint()
            .returning(move |_, _| Ok(Some(public.clone())));

        assert!(matches!(
            EnvelopeKeyStore::load(&repo, &provider),
            Err(KeyStoreError::PrivateKeyNotAccessible { version: 3, .. })
        ));
    }

    #[test]
    fn wrong_key_pair_aborts_load() {
        let pair = WrappingKeyPair::generate();
        let imposter = WrappingKeyPair::generate();
        let repo = InMemoryKeyRepository::with_records([minted(1, &pair)]);
        let mut provider = MockKeyPairProvider::new();
        provider
            .expect_resolve_by_fingerprint()
            .returning(move |_, _| Ok(Some(imposter.clone())));

        assert!(matches!(
            EnvelopeKeyStore::load(&repo, &provider),
            Err(KeyStoreError::Initialization { .. })
        ));
    }

    #[test]
    fn provider_failure_aborts_load() {
        let pair = WrappingKeyPair::generate();
        let repo = InMemoryKeyRepository::with_records([minted(1, &pair)]);
        let mut provider = MockKeyPairProvider::new();
        provider
            .expect_resolve_by_fingerprint()
            .returning(|_, _| Err(ProviderError::Backend("keystore offline".into())));

        assert!(matches!(
            EnvelopeKeyStore::load(&repo, &provider),
            Err(KeyStoreError::Initialization { .. })
        ));
    }

    #[test]
    fn repository_failure_aborts_load() {
        let mut repo = MockKeyRepository::new();
        repo.expect_list_all()
            .returning(|| Err(RepositoryError::Backend("throttled".into())));
        let err = EnvelopeKeyStore::load(&repo, &InMemoryKeyPairProvider::new()).unwrap_err();
        assert!(err.to_string().contains("failed to list key records"));
    }

    #[test]
    fn invalid_records_abort_load() {
        let pair = WrappingKeyPair::generate();
        let provider = InMemoryKeyPairProvider::new().with_pair(pair.clone());

        let mut short_iv = minted(1, &pair);
        short_iv.iv.truncate(8);
        let unversioned = minted(0, &pair);
        let mut no_fingerprint = minted(2, &pair);
        no_fingerprint.wrapping_key_fingerprint.clear();

        for record in [short_iv, unversioned, no_fingerprint] {
            let mut repo = MockKeyRepository::new();
            repo.expect_list_all()
                .return_once(move || Ok(vec![record]));
            assert!(matches!(
                EnvelopeKeyStore::load(&repo, &provider),
                Err(KeyStoreError::Initialization { .. })
            ));
        }
    }

    #[test]
    fn duplicate_versions_last_wins() {
        let pair = WrappingKeyPair::generate();
        let first = minted(9, &pair);
        let second = minted(9, &pair);
        let expected = {
            let provider = InMemoryKeyPairProvider::new().with_pair(pair.clone());
            let repo = InMemoryKeyRepository::with_records([second.clone()]);
            let store = EnvelopeKeyStore::load(&repo, &provider).unwrap();
            store.encryptor(9).unwrap().encrypt(b"x").unwrap()
        };

        let mut repo = MockKeyRepository::new();
        repo.expect_list_all()
            .return_once(move || Ok(vec![first, second]));
        let provider = InMemoryKeyPairProvider::new().with_pair(pair);
        let store = EnvelopeKeyStore::load(&repo, &provider).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.encryptor(9).unwrap().encrypt(b"x").unwrap(), expected);
    }
}
