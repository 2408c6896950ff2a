//! Serialized record shape handed to the persist/load hooks.
//!
//! An [`Entity`] is what a record store integration produces from an
//! application type just before a write, and what it receives just after a
//! read. Field-level encryption operates on these property values, never on the
//! application type itself, so a failed write leaves the caller's object intact.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a stored record: partition plus row key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub partition: String,
    pub row: String,
}

impl RecordKey {
    pub fn new(partition: impl Into<String>, row: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            row: row.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.row)
    }
}

/// A single serialized property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Text(String),
    Bytes(#[serde(with = "crate::encoding::base64_bytes")] Vec<u8>),
    Int(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Null,
}

impl PropertyValue {
    /// Short name of the value's shape, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::Text(_) => "text",
            PropertyValue::Bytes(_) => "bytes",
            PropertyValue::Int(_) => "int",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Timestamp(_) => "timestamp",
            PropertyValue::Null => "null",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(b: Vec<u8>) -> Self {
        PropertyValue::Bytes(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Int(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

/// A serialized record: key, encryption version tag, and named properties.
///
/// `encryption_version` of `None` or `Some(0)` means the record's sensitive
/// fields are stored in the clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: RecordKey,
    pub encryption_version: Option<u32>,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Entity {
    /// Create an empty, unencrypted entity.
    pub fn new(partition: impl Into<String>, row: impl Into<String>) -> Self {
        Self {
            key: RecordKey::new(partition, row),
            encryption_version: None,
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style setter for the version tag.
    pub fn with_version(mut self, version: Option<u32>) -> Self {
        self.encryption_version = version;
        self
    }

    /// Builder-style property insert.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(PropertyValue::as_text)
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.get(name).and_then(PropertyValue::as_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_key_display() {
        assert_eq!(RecordKey::new("customers", "42").to_string(), "customers/42");
    }

    #[test]
    fn builder_sets_version_and_properties() {
        let e = Entity::new("p", "r")
            .with_version(Some(1000))
            .with_property("name", "Alice")
            .with_property("blob", vec![1u8, 2, 3])
            .with_property("age", 30i64);
        assert_eq!(e.encryption_version, Some(1000));
        assert_eq!(e.text("name"), Some("Alice"));
        assert_eq!(e.bytes("blob"), Some(&[1u8, 2, 3][..]));
        assert_eq!(e.text("age"), None);
        assert_eq!(e.get("age").map(PropertyValue::kind_name), Some("int"));
    }

    #[test]
    fn property_value_json_is_tagged() {
        let json = serde_json::to_string(&PropertyValue::Bytes(vec![0xff])).unwrap();
        assert_eq!(json, r#"{"type":"bytes","value":"/w=="}"#);
        let back: PropertyValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PropertyValue::Bytes(vec![0xff]));
    }
}
