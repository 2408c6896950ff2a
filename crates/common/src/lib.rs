//! Shared data model for the `fieldcrypt` workspace.
//!
//! Nothing in this crate performs cryptography. It defines the shapes that cross
//! the boundary between the encryption library and the stores around it:
//!
//! - [`SymmetricKeyRecord`]: one persisted generation of wrapped key material.
//! - [`Entity`]: the serialized form of an application record as handed to the
//!   persist/load hooks.

pub mod encoding;
pub mod entity;
pub mod key_record;

pub use entity::{Entity, PropertyValue, RecordKey};
pub use key_record::SymmetricKeyRecord;
