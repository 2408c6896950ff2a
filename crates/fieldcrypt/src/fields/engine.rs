//! [`FieldCryptoEngine`]: versioned encryption of values and of a record's
//! sensitive fields.
//!
//! Text is encoded as UTF-8 before encryption and the ciphertext is stored as
//! standard padded base64. Byte fields are stored as raw ciphertext. Empty text
//! and empty byte values are never encrypted; they pass through unchanged, as
//! do `Null` and absent properties.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{Entity, PropertyValue, RecordKey};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::crypto::CipherError;
use crate::keys::{KeyStoreError, KeyStoreHandle};

use super::schema::{FieldKind, RecordSchema, SensitiveField};

/// Errors produced when encrypting or decrypting a single value.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Version missing from the active store, or no store published yet.
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    /// Input is not valid base64.
    #[error("ciphertext is not valid base64")]
    MalformedCiphertext(#[source] base64::DecodeError),

    #[error("encryption failed")]
    EncryptionFailure(#[source] CipherError),

    /// Wrong key, tampered ciphertext, or plaintext that is not valid UTF-8.
    #[error("decryption failed")]
    DecryptionFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// What went wrong with one field of a sweep.
#[derive(Debug, Error)]
pub enum FieldErrorCause {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("field kind `{0}` cannot be encrypted")]
    UnsupportedFieldKind(FieldKind),

    #[error("declared as `{declared}` but stored as `{found}`")]
    FieldKindMismatch {
        declared: FieldKind,
        found: &'static str,
    },
}

/// Direction of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Encrypt,
    Decrypt,
}

impl fmt::Display for FieldOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldOp::Encrypt => "encrypt",
            FieldOp::Decrypt => "decrypt",
        })
    }
}

/// A field of a record could not be processed.
#[derive(Debug, Error)]
#[error("failed to {op} field `{field}` of {record_type} record {record} under version {version}")]
pub struct FieldCryptoError {
    pub record: RecordKey,
    pub record_type: &'static str,
    pub field: &'static str,
    pub version: u32,
    pub op: FieldOp,
    #[source]
    pub cause: FieldErrorCause,
}

/// What a decrypt sweep does when one field fails.
///
/// Encryption always aborts; this only governs reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptFailurePolicy {
    /// Fail the whole record.
    #[default]
    Abort,
    /// Log the failure, leave the field as stored, and carry on.
    SkipField,
}

/// Outcome of a successful sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Fields that were transformed.
    pub processed: usize,
    /// Fields left as stored under [`DecryptFailurePolicy::SkipField`].
    pub skipped: Vec<&'static str>,
}

/// Encrypts and decrypts values with keys from a [`KeyStoreHandle`].
#[derive(Debug, Clone)]
pub struct FieldCryptoEngine {
    keys: KeyStoreHandle,
    policy: DecryptFailurePolicy,
}

impl FieldCryptoEngine {
    /// An engine with the default [`DecryptFailurePolicy::Abort`] policy.
    pub fn new(keys: KeyStoreHandle) -> Self {
        Self {
            keys,
            policy: DecryptFailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DecryptFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> DecryptFailurePolicy {
        self.policy
    }

    pub fn keys(&self) -> &KeyStoreHandle {
        &self.keys
    }

    /// Encrypt `plaintext` under `version`. The same plaintext and version
    /// always produce the same ciphertext.
    pub fn encrypt_bytes(&self, version: u32, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.keys
            .encryptor(version)?
            .encrypt(plaintext)
            .map_err(CryptoError::EncryptionFailure)
    }

    pub fn decrypt_bytes(&self, version: u32, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.keys
            .decryptor(version)?
            .decrypt(ciphertext)
            .map_err(|e| CryptoError::DecryptionFailure(Box::new(e)))
    }

    /// Encrypt UTF-8 `text` under `version` and return base64 ciphertext.
    pub fn encrypt_text(&self, version: u32, text: &str) -> Result<String, CryptoError> {
        self.encrypt_bytes(version, text.as_bytes())
            .map(|ct| STANDARD.encode(ct))
    }

    /// Decode base64 `ciphertext` and decrypt it under `version`.
    ///
    /// # Errors
    ///
    /// [`CryptoError::MalformedCiphertext`] if the input is not base64,
    /// [`CryptoError::DecryptionFailure`] for any cryptographic or UTF-8 error.
    pub fn decrypt_text(&self, version: u32, ciphertext: &str) -> Result<String, CryptoError> {
        let raw = STANDARD
            .decode(ciphertext)
            .map_err(CryptoError::MalformedCiphertext)?;
        let plain = self.decrypt_bytes(version, &raw)?;
        String::from_utf8(plain).map_err(|e| CryptoError::DecryptionFailure(Box::new(e)))
    }

    /// Encrypt every declared sensitive field of `entity` under `version`.
    ///
    /// All-or-nothing: on error `entity` is left exactly as it was.
    ///
    /// # Errors
    ///
    /// The first field failure, wrapped with record identity and field name.
    pub fn encrypt_fields<R: RecordSchema>(
        &self,
        version: u32,
        entity: &mut Entity,
    ) -> Result<SweepReport, FieldCryptoError> {
        let mut staged = Vec::new();
        for field in R::sensitive_fields() {
            match self.transform(FieldOp::Encrypt, version, field, entity.get(field.name)) {
                Ok(Some(value)) => staged.push((field.name, value)),
                Ok(None) => {}
                Err(cause) => {
                    return Err(field_error::<R>(entity, field, version, FieldOp::Encrypt, cause))
                }
            }
        }

        let processed = staged.len();
        for (name, value) in staged {
            entity.set(name, value);
        }
        Ok(SweepReport {
            processed,
            skipped: Vec::new(),
        })
    }

    /// Decrypt every declared sensitive field of `entity` under `version`.
    ///
    /// Under [`DecryptFailurePolicy::Abort`] this is all-or-nothing like
    /// [`encrypt_fields`](Self::encrypt_fields). Under
    /// [`DecryptFailurePolicy::SkipField`] failed fields are logged, left as
    /// stored, and listed in the report.
    pub fn decrypt_fields<R: RecordSchema>(
        &self,
        version: u32,
        entity: &mut Entity,
    ) -> Result<SweepReport, FieldCryptoError> {
        let mut staged = Vec::new();
        let mut skipped = Vec::new();
        for field in R::sensitive_fields() {
            match self.transform(FieldOp::Decrypt, version, field, entity.get(field.name)) {
                Ok(Some(value)) => staged.push((field.name, value)),
                Ok(None) => {}
                Err(cause) => {
                    let err = field_error::<R>(entity, field, version, FieldOp::Decrypt, cause);
                    match self.policy {
                        DecryptFailurePolicy::Abort => return Err(err),
                        DecryptFailurePolicy::SkipField => {
                            warn!(
                                record = %err.record,
                                record_type = R::TYPE_NAME,
                                field = field.name,
                                version,
                                error = %err.cause,
                                "field decryption failed; leaving field as stored"
                            );
                            skipped.push(field.name);
                        }
                    }
                }
            }
        }

        let processed = staged.len();
        for (name, value) in staged {
            entity.set(name, value);
        }
        Ok(SweepReport { processed, skipped })
    }

    /// New value for one field, or `None` if it passes through.
    fn transform(
        &self,
        op: FieldOp,
        version: u32,
        field: &SensitiveField,
        value: Option<&PropertyValue>,
    ) -> Result<Option<PropertyValue>, FieldErrorCause> {
        if !field.kind.is_encryptable() {
            return Err(FieldErrorCause::UnsupportedFieldKind(field.kind));
        }

        let value = match value {
            None | Some(PropertyValue::Null) => return Ok(None),
            Some(value) if !field.kind.matches(value) => {
                return Err(FieldErrorCause::FieldKindMismatch {
                    declared: field.kind,
                    found: value.kind_name(),
                })
            }
            Some(value) => value,
        };

        let out = match (op, value) {
            (_, PropertyValue::Text(s)) if s.is_empty() => return Ok(None),
            (_, PropertyValue::Bytes(b)) if b.is_empty() => return Ok(None),
            (FieldOp::Encrypt, PropertyValue::Text(s)) => {
                PropertyValue::Text(self.encrypt_text(version, s)?)
            }
            (FieldOp::Decrypt, PropertyValue::Text(s)) => {
                PropertyValue::Text(self.decrypt_text(version, s)?)
            }
            (FieldOp::Encrypt, PropertyValue::Bytes(b)) => {
                PropertyValue::Bytes(self.encrypt_bytes(version, b)?)
            }
            (FieldOp::Decrypt, PropertyValue::Bytes(b)) => {
                PropertyValue::Bytes(self.decrypt_bytes(version, b)?)
            }
            (_, other) => {
                return Err(FieldErrorCause::FieldKindMismatch {
                    declared: field.kind,
                    found: other.kind_name(),
                })
            }
        };
        Ok(Some(out))
    }
}

fn field_error<R: RecordSchema>(
    entity: &Entity,
    field: &SensitiveField,
    version: u32,
    op: FieldOp,
    cause: FieldErrorCause,
) -> FieldCryptoError {
    FieldCryptoError {
        record: entity.key.clone(),
        record_type: R::TYPE_NAME,
        field: field.name,
        version,
        op,
        cause,
    }
}
