//! Static declaration of which record fields are encrypted.
//!
//! Each record type implements [`RecordSchema`] with a `const` table:
//!
//! ```
//! use fieldcrypt::fields::{RecordSchema, SensitiveField};
//!
//! struct Customer;
//!
//! impl RecordSchema for Customer {
//!     const TYPE_NAME: &'static str = "Customer";
//!
//!     fn sensitive_fields() -> &'static [SensitiveField] {
//!         const FIELDS: &[SensitiveField] = &[
//!             SensitiveField::text("email"),
//!             SensitiveField::bytes("photo"),
//!         ];
//!         FIELDS
//!     }
//! }
//! ```

use std::fmt;

use common::PropertyValue;

/// Payload kind of a declared field.
///
/// Only [`FieldKind::Text`] and [`FieldKind::Bytes`] can be encrypted; the
/// other kinds exist so that a wrong declaration is reported instead of
/// silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Bytes,
    Int,
    Bool,
    Timestamp,
}

impl FieldKind {
    pub fn is_encryptable(self) -> bool {
        matches!(self, FieldKind::Text | FieldKind::Bytes)
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Bytes => "bytes",
            FieldKind::Int => "int",
            FieldKind::Bool => "bool",
            FieldKind::Timestamp => "timestamp",
        }
    }

    /// Returns `true` if `value` has the shape this kind declares.
    pub fn matches(self, value: &PropertyValue) -> bool {
        matches!(
            (self, value),
            (FieldKind::Text, PropertyValue::Text(_))
                | (FieldKind::Bytes, PropertyValue::Bytes(_))
                | (FieldKind::Int, PropertyValue::Int(_))
                | (FieldKind::Bool, PropertyValue::Bool(_))
                | (FieldKind::Timestamp, PropertyValue::Timestamp(_))
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One declared sensitive field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensitiveField {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl SensitiveField {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub const fn bytes(name: &'static str) -> Self {
        Self::new(name, FieldKind::Bytes)
    }
}

/// Implemented by every record type that carries encrypted fields.
pub trait RecordSchema {
    /// Type name used in errors and logs.
    const TYPE_NAME: &'static str;

    fn sensitive_fields() -> &'static [SensitiveField];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_text_and_bytes_are_encryptable() {
        assert!(FieldKind::Text.is_encryptable());
        assert!(FieldKind::Bytes.is_encryptable());
        assert!(!FieldKind::Int.is_encryptable());
        assert!(!FieldKind::Bool.is_encryptable());
        assert!(!FieldKind::Timestamp.is_encryptable());
    }

    #[test]
    fn kind_matches_value_shape() {
        assert!(FieldKind::Text.matches(&PropertyValue::from("x")));
        assert!(!FieldKind::Text.matches(&PropertyValue::from(vec![1u8])));
        assert!(FieldKind::Bytes.matches(&PropertyValue::from(vec![1u8])));
        assert!(!FieldKind::Bytes.matches(&PropertyValue::Null));
        assert!(FieldKind::Int.matches(&PropertyValue::from(3i64)));
    }

    #[test]
    fn const_constructors() {
        const F: SensitiveField = SensitiveField::text("ssn");
        assert_eq!(F.kind, FieldKind::Text);
        assert_eq!(SensitiveField::bytes("scan").kind.to_string(), "bytes");
    }
}
