//! Field values and declared field types.

use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The declared type of a synchronized field.
///
/// The first six variants have a wire form and are coerced when a record
/// is imported. `Binary` and `List` can be declared on an entity (e.g. for
/// attachment payloads or local collections) but have no tabular form;
/// the codec reports them as unsupported and skips the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// UTF-8 text.
    String,
    /// 64-bit signed integer.
    Int,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Boolean.
    Bool,
    /// UTC timestamp in the fixed wire format.
    Timestamp,
    /// Raw bytes (no wire form).
    Binary,
    /// Nested list (no wire form).
    List,
}

impl FieldType {
    /// Returns true if values of this type can travel in the tabular format.
    pub fn has_wire_form(&self) -> bool {
        !matches!(self, FieldType::Binary | FieldType::List)
    }

    /// Returns the type name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Bool => "bool",
            FieldType::Timestamp => "timestamp",
            FieldType::Binary => "binary",
            FieldType::List => "list",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name and declared type of one table field.
///
/// `name` is the local (camelCase) field name. Names starting with
/// [`RESERVED_PREFIX`] are local-only and never cross the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Local field name.
    pub name: String,
    /// Declared type.
    pub ty: FieldType,
}

/// Prefix marking local-only fields.
pub const RESERVED_PREFIX: char = '_';

impl FieldDef {
    /// Creates a field definition.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Returns true if the field is local-only.
    pub fn is_reserved(&self) -> bool {
        self.name.starts_with(RESERVED_PREFIX)
    }
}

/// A dynamically typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value.
    Null,
    /// Text value.
    Text(String),
    /// Integer value.
    Int(i64),
    /// Single-precision float.
    Float(f32),
    /// Double-precision float.
    Double(f64),
    /// Boolean value.
    Bool(bool),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns the wire form of this value, or `None` for bytes.
    ///
    /// Null encodes as the empty string and timestamps use the fixed
    /// UTC format.
    pub fn to_wire(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Text(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Double(d) => Some(d.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Timestamp(ts) => Some(timestamp::format(ts)),
            Value::Bytes(_) => None,
        }
    }

    /// Returns the text if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is an integer value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as `f64` for either float width.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(f64::from(*f)),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the boolean if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the timestamp if this is a timestamp value.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
