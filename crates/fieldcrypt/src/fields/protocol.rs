//! [`VersionedRecordProtocol`]: the `before_persist` / `after_load` hooks a
//! record store integration calls around every write and read.
//!
//! A record's version tag decides what happens:
//!
//! | tag          | before_persist                           | after_load                    |
//! |--------------|------------------------------------------|-------------------------------|
//! | `None` / `0` | untouched                                | untouched                     |
//! | positive     | stamp the write version, encrypt with it | decrypt with the record's tag |
//!
//! Reads always use the tag stored on the row, so rows written under a
//! retired version stay readable while that version is still in the store.

use common::Entity;
use tracing::debug;

use super::engine::{FieldCryptoEngine, FieldCryptoError, SweepReport};
use super::schema::RecordSchema;

/// State of a record's version tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagState {
    Disabled,
    Active(u32),
}

impl TagState {
    pub fn of(tag: Option<u32>) -> Self {
        match tag {
            None | Some(0) => TagState::Disabled,
            Some(v) => TagState::Active(v),
        }
    }
}

/// Per-record read and write contract.
#[derive(Debug, Clone)]
pub struct VersionedRecordProtocol {
    engine: FieldCryptoEngine,
    write_version: Option<u32>,
    enabled: bool,
}

impl VersionedRecordProtocol {
    /// `write_version` is the version stamped on outgoing records. `None` (or
    /// `Some(0)`) means new writes are stored in the clear.
    pub fn new(engine: FieldCryptoEngine, write_version: Option<u32>) -> Self {
        Self {
            engine,
            write_version: write_version.filter(|&v| v > 0),
            enabled: true,
        }
    }

    /// With `enabled = false` both hooks do nothing, giving raw access to
    /// stored values.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn write_version(&self) -> Option<u32> {
        self.write_version
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn engine(&self) -> &FieldCryptoEngine {
        &self.engine
    }

    /// Pre-write hook.
    ///
    /// A record with a positive tag is restamped with the current write
    /// version and its sensitive fields are encrypted. If no write version is
    /// configured the tag is cleared instead and nothing is encrypted.
    ///
    /// # Errors
    ///
    /// Any field failure. The entity, tag included, is left unchanged.
    pub fn before_persist<R: RecordSchema>(
        &self,
        entity: &mut Entity,
    ) -> Result<SweepReport, FieldCryptoError> {
        if !self.enabled {
            return Ok(SweepReport::default());
        }
        if TagState::of(entity.encryption_version) == TagState::Disabled {
            return Ok(SweepReport::default());
        }

        let Some(version) = self.write_version else {
            debug!(record = %entity.key, "no write version configured; clearing encryption tag");
            entity.encryption_version = None;
            return Ok(SweepReport::default());
        };

        let original = entity.encryption_version.replace(version);
        match self.engine.encrypt_fields::<R>(version, entity) {
            Ok(report) => Ok(report),
            Err(e) => {
                entity.encryption_version = original;
                Err(e)
            }
        }
    }

    /// Post-read hook. Decrypts with the version stored on the record.
    ///
    /// # Errors
    ///
    /// Any field failure not absorbed by the engine's
    /// [`DecryptFailurePolicy`](super::DecryptFailurePolicy).
    pub fn after_load<R: RecordSchema>(
        &self,
        entity: &mut Entity,
    ) -> Result<SweepReport, FieldCryptoError> {
        if !self.enabled {
            return Ok(SweepReport::default());
        }
        match TagState::of(entity.encryption_version) {
            TagState::Disabled => Ok(SweepReport::default()),
            TagState::Active(version) => self.engine.decrypt_fields::<R>(version, entity),
        }
    }
}
