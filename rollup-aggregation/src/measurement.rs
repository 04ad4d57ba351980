//! Input measurements and the values they carry.

use std::collections::BTreeMap;
use std::time::SystemTime;

/// A value carried by a measurement or an emitted point.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A floating point number.
    Float(f64),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer.
    UInt(u64),
    /// A boolean. Never aggregated.
    Bool(bool),
    /// A string. Never aggregated.
    String(String),
    /// Opaque bytes, used for encoded digest snapshots.
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// The numeric value, if this value is aggregatable.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            Self::Bool(_) | Self::String(_) | Self::Bytes(_) => None,
        }
    }

    /// The bytes, if this is a [`FieldValue::Bytes`].
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// A named, tagged set of field values observed at a point in time.
///
/// ```
/// use rollup_aggregation::Measurement;
/// use std::time::UNIX_EPOCH;
///
/// let measurement = Measurement::new("cpu", UNIX_EPOCH)
///     .with_tag("rollup", "gauge:*")
///     .with_tag("service", "api")
///     .with_field("used", 0.25);
/// assert_eq!(measurement.fields["used"].as_f64(), Some(0.25));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Measurement name, the prefix of every emitted point name.
    pub name: String,
    /// Tags, including the `rollup` marker when the measurement should be aggregated.
    pub tags: BTreeMap<String, String>,
    /// Field values. Only numeric fields are aggregated.
    pub fields: BTreeMap<String, FieldValue>,
    /// When the measurement was taken.
    pub timestamp: SystemTime,
}

impl Measurement {
    /// Create a measurement with no tags or fields.
    pub fn new(name: impl Into<String>, timestamp: SystemTime) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    /// Add a tag, replacing any previous value.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field, replacing any previous value.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}
