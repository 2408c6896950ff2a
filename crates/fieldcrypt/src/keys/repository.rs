//! [`KeyRepository`]: persistence boundary for [`SymmetricKeyRecord`]s.
//!
//! Two implementations ship with the crate: [`InMemoryKeyRepository`] for
//! tests and embedding, and [`FileKeyRepository`], a JSON file in a directory,
//! which is what the administrative CLI writes to.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use common::SymmetricKeyRecord;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::debug;

/// File name of the key collection inside a [`FileKeyRepository`] directory.
pub const KEYS_FILE_NAME: &str = "symmetric_keys.json";

/// Errors produced by a key repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The backing collection has not been created yet. Readers treat this as
    /// "no keys", not as a fault.
    #[error("key collection does not exist")]
    CollectionNotFound,

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed key collection {path}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Any other failure reported by a backend.
    #[error("key repository backend error: {0}")]
    Backend(String),
}

/// Storage for symmetric key records, keyed by version.
///
/// Implementations must be safe to share between threads. All calls are
/// blocking and made on the caller's thread.
#[cfg_attr(test, mockall::automock)]
pub trait KeyRepository: Send + Sync {
    /// Create the backing collection if it does not exist yet.
    fn create_if_missing(&self) -> Result<(), RepositoryError>;

    /// Snapshot of every stored record.
    ///
    /// Returns [`RepositoryError::CollectionNotFound`] if the collection has
    /// never been created.
    fn list_all(&self) -> Result<Vec<SymmetricKeyRecord>, RepositoryError>;

    /// Insert or replace the record with the same version.
    fn save(&self, record: &SymmetricKeyRecord) -> Result<(), RepositoryError>;

    /// Remove the record with the same version. Removing an absent version is
    /// not an error.
    fn delete(&self, record: &SymmetricKeyRecord) -> Result<(), RepositoryError>;
}

/// Process-local repository, absent until [`KeyRepository::create_if_missing`].
#[derive(Debug, Default)]
pub struct InMemoryKeyRepository {
    records: RwLock<Option<BTreeMap<u32, SymmetricKeyRecord>>>,
}

impl InMemoryKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository whose collection already exists and holds `records`.
    pub fn with_records(records: impl IntoIterator<Item = SymmetricKeyRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.version, r)).collect();
        Self {
            records: RwLock::new(Some(map)),
        }
    }
}

impl KeyRepository for InMemoryKeyRepository {
    fn create_if_missing(&self) -> Result<(), RepositoryError> {
        self.records.write().get_or_insert_with(BTreeMap::new);
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<SymmetricKeyRecord>, RepositoryError> {
        self.records
            .read()
            .as_ref()
            .map(|m| m.values().cloned().collect())
            .ok_or(RepositoryError::CollectionNotFound)
    }

    fn save(&self, record: &SymmetricKeyRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.write();
        let map = guard.as_mut().ok_or(RepositoryError::CollectionNotFound)?;
        map.insert(record.version, record.clone());
        Ok(())
    }

    fn delete(&self, record: &SymmetricKeyRecord) -> Result<(), RepositoryError> {
        if let Some(map) = self.records.write().as_mut() {
            map.remove(&record.version);
        }
        Ok(())
    }
}

/// Key collection stored as a JSON array in `<dir>/symmetric_keys.json`.
///
/// Writes go to a sibling temporary file that is then renamed over the
/// collection, so readers never see a half-written file. Writers within one
/// process are serialised; concurrent writers in separate processes are not
/// coordinated.
#[derive(Debug)]
pub struct FileKeyRepository {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the collection file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(KEYS_FILE_NAME)
    }

    fn read(&self) -> Result<Vec<SymmetricKeyRecord>, RepositoryError> {
        let path = self.path();
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RepositoryError::CollectionNotFound)
            }
            Err(source) => return Err(RepositoryError::Io { path, source }),
        };
        serde_json::from_slice(&raw).map_err(|source| RepositoryError::Malformed { path, source })
    }

    fn write(&self, records: &[SymmetricKeyRecord]) -> Result<(), RepositoryError> {
        let path = self.path();
        let json = serde_json::to_vec_pretty(records).map_err(|source| {
            RepositoryError::Malformed {
                path: path.clone(),
                source,
            }
        })?;

        let tmp = self.dir.join(format!("{KEYS_FILE_NAME}.tmp"));
        let io_err = |source| RepositoryError::Io {
            path: tmp.clone(),
            source,
        };
        let mut file = File::create(&tmp).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        fs::rename(&tmp, &path).map_err(|source| RepositoryError::Io {
            path: path.clone(),
            source,
        })?;
        // Persist the rename itself.
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }
        debug!(count = records.len(), "key collection written");
        Ok(())
    }
}

impl KeyRepository for FileKeyRepository {
    fn create_if_missing(&self) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock();
        fs::create_dir_all(&self.dir).map_err(|source| RepositoryError::Io {
            path: self.dir.clone(),
            source,
        })?;
        match self.read() {
            Err(RepositoryError::CollectionNotFound) => self.write(&[]),
            other => other.map(|_| ()),
        }
    }

    fn list_all(&self) -> Result<Vec<SymmetricKeyRecord>, RepositoryError> {
        self.read()
    }

    fn save(&self, record: &SymmetricKeyRecord) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock();
        let mut records = self.read()?;
        records.retain(|r| r.version != record.version);
        records.push(record.clone());
        records.sort_by_key(|r| r.version);
        self.write(&records)
    }

    fn delete(&self, record: &SymmetricKeyRecord) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock();
        let mut records = match self.read() {
            Ok(records) => records,
            Err(RepositoryError::CollectionNotFound) => return Ok(()),
            Err(e) => return Err(e),
        };
        let before = records.len();
        records.retain(|r| r.version != record.version);
        if records.len() == before {
            return Ok(());
        }
        self.write(&records)
    }
}
