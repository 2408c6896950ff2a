//! [`KeyPairProvider`]: lookup of wrapping key pairs by fingerprint.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::crypto::{normalize_fingerprint, WrappingKeyPair};

/// Errors produced by a key pair provider.
///
/// "Not found" is not an error; providers return `Ok(None)` for it.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The pair exists but its private half cannot be used.
    #[error("private key of key pair {fingerprint} is not accessible")]
    PrivateKeyNotAccessible { fingerprint: String },

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("key pair provider backend error: {0}")]
    Backend(String),
}

/// Resolves the key pair that wraps a symmetric key.
#[cfg_attr(test, mockall::automock)]
pub trait KeyPairProvider: Send + Sync {
    /// Look up a key pair by fingerprint. Fingerprints are compared after
    /// [`normalize_fingerprint`].
    ///
    /// With `require_private` set, a returned pair always carries its private
    /// half.
    fn resolve_by_fingerprint(
        &self,
        fingerprint: &str,
        require_private: bool,
    ) -> Result<Option<WrappingKeyPair>, ProviderError>;
}

/// Key pairs held in memory, keyed by fingerprint.
///
/// A public-only pair requested with `require_private` yields
/// [`ProviderError::PrivateKeyNotAccessible`].
#[derive(Debug, Default)]
pub struct InMemoryKeyPairProvider {
    pairs: RwLock<HashMap<String, WrappingKeyPair>>,
}

impl InMemoryKeyPairProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(self, pair: WrappingKeyPair) -> Self {
        self.insert(pair);
        self
    }

    /// Add or replace a pair.
    pub fn insert(&self, pair: WrappingKeyPair) {
        self.pairs.write().insert(pair.fingerprint().to_owned(), pair);
    }

    pub fn remove(&self, fingerprint: &str) -> Option<WrappingKeyPair> {
        self.pairs.write().remove(&normalize_fingerprint(fingerprint))
    }
}

impl KeyPairProvider for InMemoryKeyPairProvider {
    fn resolve_by_fingerprint(
        &self,
        fingerprint: &str,
        require_private: bool,
    ) -> Result<Option<WrappingKeyPair>, ProviderError> {
        let fingerprint = normalize_fingerprint(fingerprint);
        match self.pairs.read().get(&fingerprint) {
            Some(pair) if require_private && !pair.has_private_key() => {
                Err(ProviderError::PrivateKeyNotAccessible { fingerprint })
            }
            found => Ok(found.cloned()),
        }
    }
}

/// A directory of P-256 JWK files (`*.jwk` or `*.json`).
///
/// Parsed pairs are cached by fingerprint. The directory is rescanned only
/// when a lookup misses the cache, or finds just the public half while the
/// private half is required. Clones share the cache.
///
/// Files that do not parse as a P-256 JWK are skipped with a warning. When the
/// same fingerprint appears more than once, a file carrying the private half
/// wins. A public-only match requested with `require_private` yields
/// [`ProviderError::PrivateKeyNotAccessible`].
#[derive(Debug, Clone)]
pub struct JwkDirectoryProvider {
    dir: PathBuf,
    cache: Arc<RwLock<HashMap<String, WrappingKeyPair>>>,
}

impl JwkDirectoryProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Arc::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `pair` into the directory as `<fingerprint>.jwk`, with or without
    /// its private half.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::PrivateKeyNotAccessible`] if `include_private`
    /// is set on a public-only pair, or [`ProviderError::Io`] on write failure.
    pub fn install(
        &self,
        pair: &WrappingKeyPair,
        include_private: bool,
    ) -> Result<PathBuf, ProviderError> {
        let jwk = if include_private {
            pair.to_private_jwk()
                .ok_or_else(|| ProviderError::PrivateKeyNotAccessible {
                    fingerprint: pair.fingerprint().to_owned(),
                })?
        } else {
            Zeroizing::new(pair.to_public_jwk())
        };

        fs::create_dir_all(&self.dir).map_err(|source| ProviderError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.dir.join(format!("{}.jwk", pair.fingerprint()));
        fs::write(&path, jwk.as_bytes()).map_err(|source| ProviderError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Re-read the directory and replace the cache with its contents.
    fn rescan(&self) -> Result<(), ProviderError> {
        let mut found: HashMap<String, WrappingKeyPair> = HashMap::new();
        for pair in self.scan()? {
            match found.get(pair.fingerprint()) {
                Some(existing) if existing.has_private_key() => {}
                _ => {
                    found.insert(pair.fingerprint().to_owned(), pair);
                }
            }
        }
        debug!(dir = %self.dir.display(), count = found.len(), "key pair directory scanned");
        *self.cache.write() = found;
        Ok(())
    }

    fn cached(&self, fingerprint: &str) -> Option<WrappingKeyPair> {
        self.cache.read().get(fingerprint).cloned()
    }

    fn scan(&self) -> Result<Vec<WrappingKeyPair>, ProviderError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| ProviderError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut pairs = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| ProviderError::Io {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            let is_jwk = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jwk") || ext.eq_ignore_ascii_case("json"));
            if !is_jwk || !path.is_file() {
                continue;
            }

            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable key pair file skipped");
                    continue;
                }
            };
            match WrappingKeyPair::from_jwk_str(raw.trim()) {
                Ok(pair) => pairs.push(pair),
                Err(e) => warn!(path = %path.display(), error = %e, "invalid key pair file skipped"),
            }
        }
        Ok(pairs)
    }
}

impl KeyPairProvider for JwkDirectoryProvider {
    fn resolve_by_fingerprint(
        &self,
        fingerprint: &str,
        require_private: bool,
    ) -> Result<Option<WrappingKeyPair>, ProviderError> {
        let wanted = normalize_fingerprint(fingerprint);

        let pair = match self.cached(&wanted) {
            Some(pair) if pair.has_private_key() || !require_private => Some(pair),
            _ => {
                self.rescan()?;
                self.cached(&wanted)
            }
        };

        match pair {
            Some(pair) if require_private && !pair.has_private_key() => {
                debug!(fingerprint = %wanted, "only the public half of key pair is available");
                Err(ProviderError::PrivateKeyNotAccessible { fingerprint: wanted })
            }
            found => Ok(found),
        }
    }
}
