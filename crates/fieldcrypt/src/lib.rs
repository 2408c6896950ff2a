//! `fieldcrypt`: versioned field-level envelope encryption for table records.
//!
//! # Layout
//!
//! - [`crypto`]: the symmetric cipher, wrapping key pairs and the key wrap codec.
//! - [`keys`]: key repositories, key pair providers, the immutable
//!   [`EnvelopeKeyStore`] and the swappable [`KeyStoreHandle`], and the
//!   [`KeyGenerator`] used for rotation.
//! - [`fields`]: record sensitivity declarations, the [`FieldCryptoEngine`] and
//!   the [`VersionedRecordProtocol`] hooks.
//! - [`FieldCrypto`]: all of the above wired together from [`CryptoConfig`].
//!
//! # Security invariants
//!
//! - Raw symmetric keys never leave process memory and are zeroed on drop.
//! - Key material and plaintext field values are never logged.
//! - A store that failed to build is never published.

pub mod config;
pub mod context;
pub mod crypto;
pub mod fields;
pub mod keys;

pub use config::CryptoConfig;
pub use context::FieldCrypto;
pub use fields::{
    CryptoError, DecryptFailurePolicy, FieldCryptoEngine, FieldCryptoError, FieldKind,
    RecordSchema, SensitiveField, VersionedRecordProtocol,
};
pub use keys::{EnvelopeKeyStore, KeyGenerator, KeyStoreError, KeyStoreHandle};
