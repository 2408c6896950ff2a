//! Field-level encryption of serialized records.

pub mod engine;
pub mod protocol;
pub mod schema;

pub use engine::{
    CryptoError, DecryptFailurePolicy, FieldCryptoEngine, FieldCryptoError, FieldErrorCause,
    FieldOp, SweepReport,
};
pub use protocol::{TagState, VersionedRecordProtocol};
pub use schema::{FieldKind, RecordSchema, SensitiveField};
