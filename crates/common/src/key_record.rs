//! [`SymmetricKeyRecord`]: the persisted form of one generation of key material.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One generation of symmetric key material, as stored in a key repository.
///
/// The raw symmetric key never appears here: `wrapped_key` is the key encrypted
/// under the public half of the key pair named by `wrapping_key_fingerprint`.
/// The IV is not secret and is stored in the clear.
///
/// `version` is the record's identity. A value of `0` means "not yet assigned"
/// and is only seen on records fresh out of a key generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymmetricKeyRecord {
    /// Caller-assigned encryption version; unique per repository.
    pub version: u32,
    /// Asymmetrically wrapped symmetric key bytes.
    #[serde(with = "crate::encoding::base64_bytes")]
    pub wrapped_key: Vec<u8>,
    /// Initialization vector used with this key for every encryption.
    #[serde(with = "crate::encoding::base64_bytes")]
    pub iv: Vec<u8>,
    /// Fingerprint of the key pair required to unwrap `wrapped_key`.
    pub wrapping_key_fingerprint: String,
    /// When this generation was minted.
    pub created_at: DateTime<Utc>,
}

impl SymmetricKeyRecord {
    /// Build a record with no version assigned yet, stamped with the current time.
    pub fn unversioned(
        wrapped_key: Vec<u8>,
        iv: Vec<u8>,
        wrapping_key_fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            version: 0,
            wrapped_key,
            iv,
            wrapping_key_fingerprint: wrapping_key_fingerprint.into(),
            created_at: Utc::now(),
        }
    }

    /// Assign the encryption version, consuming the record.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Returns `true` once a non-zero version has been assigned.
    pub fn has_version(&self) -> bool {
        self.version > 0
    }
}
