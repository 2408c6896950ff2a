//! [`KeyStoreHandle`]: the shared, atomically swappable active key store.
//!
//! Readers take a lock-free snapshot on every call, so each encrypt or
//! decrypt sees either the old or the new store in full. A retired store is
//! dropped, and its key bytes zeroed, when the last snapshot referencing it
//! goes away.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, info, warn};

use crate::crypto::{Decryptor, Encryptor};

use super::provider::KeyPairProvider;
use super::repository::KeyRepository;
use super::store::{EnvelopeKeyStore, KeyStoreError};

/// Cloneable handle to the active [`EnvelopeKeyStore`].
///
/// All clones share the same active store and key pair provider.
#[derive(Clone)]
pub struct KeyStoreHandle {
    active: Arc<ArcSwapOption<EnvelopeKeyStore>>,
    provider: Arc<dyn KeyPairProvider>,
}

impl KeyStoreHandle {
    /// A handle with no active store. Call [`initialize`](Self::initialize)
    /// before use.
    pub fn new(provider: Arc<dyn KeyPairProvider>) -> Self {
        Self {
            active: Arc::new(ArcSwapOption::empty()),
            provider,
        }
    }

    /// Build and publish a store from `repository`, unless one is already
    /// active. Returns `true` if this call published the store.
    ///
    /// When two callers race, both build but only the first to publish wins;
    /// the loser's store is discarded.
    ///
    /// # Errors
    ///
    /// Any [`EnvelopeKeyStore::load`] error. Nothing is published on failure.
    pub fn initialize(&self, repository: &dyn KeyRepository) -> Result<bool, KeyStoreError> {
        if self.is_initialised() {
            debug!("key store already initialised");
            return Ok(false);
        }

        let store = Arc::new(EnvelopeKeyStore::load(repository, self.provider.as_ref())?);
        let versions = store.len();
        let empty: Option<Arc<EnvelopeKeyStore>> = None;
        let previous = self.active.compare_and_swap(&empty, Some(store));
        let published = previous.is_none();
        if published {
            info!(versions, "key store initialised");
        } else {
            debug!("key store initialised concurrently; discarding duplicate");
        }
        Ok(published)
    }

    /// Build a fresh store from `repository` and publish it in place of the
    /// active one.
    ///
    /// # Errors
    ///
    /// Any [`EnvelopeKeyStore::load`] error. The previously active store, if
    /// any, keeps serving.
    pub fn reload(&self, repository: &dyn KeyRepository) -> Result<(), KeyStoreError> {
        let store = match EnvelopeKeyStore::load(repository, self.provider.as_ref()) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "key store reload failed; keeping active store");
                return Err(e);
            }
        };
        let versions = store.len();
        self.active.store(Some(Arc::new(store)));
        info!(versions, "key store reloaded");
        Ok(())
    }

    /// Snapshot of the active store.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::NotInitialised`] before the first successful
    /// [`initialize`](Self::initialize) or [`reload`](Self::reload).
    pub fn current(&self) -> Result<Arc<EnvelopeKeyStore>, KeyStoreError> {
        self.active.load_full().ok_or(KeyStoreError::NotInitialised)
    }

    pub fn is_initialised(&self) -> bool {
        self.active.load().is_some()
    }

    /// Returns `true` if the active store holds `version`. `false` before
    /// initialisation.
    pub fn has_version(&self, version: u32) -> bool {
        match &*self.active.load() {
            Some(store) => store.has_version(version),
            None => false,
        }
    }

    /// Encryptor for `version` from the active store.
    pub fn encryptor(&self, version: u32) -> Result<Encryptor, KeyStoreError> {
        match &*self.active.load() {
            Some(store) => store.encryptor(version),
            None => Err(KeyStoreError::NotInitialised),
        }
    }

    /// Decryptor for `version` from the active store.
    pub fn decryptor(&self, version: u32) -> Result<Decryptor, KeyStoreError> {
        match &*self.active.load() {
            Some(store) => store.decryptor(version),
            None => Err(KeyStoreError::NotInitialised),
        }
    }
}

impl std::fmt::Debug for KeyStoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let versions: Option<Vec<u32>> = self
            .active
            .load()
            .as_deref()
            .map(|s| s.versions().collect());
        f.debug_struct("KeyStoreHandle")
            .field("versions", &versions)
            .finish_non_exhaustive()
    }
}
