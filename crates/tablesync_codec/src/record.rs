//! Record export and import with schema-driven coercion.

use crate::names::{to_local_name, to_wire_name};
use crate::timestamp;
use crate::value::{FieldDef, FieldType, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Wire name of the correlation id column.
pub const CLIENT_ID_COLUMN: &str = "client_id";

/// A record in wire form: ordered `(wire name, wire value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WireRecord {
    /// Field pairs in export order.
    pub fields: Vec<(String, String)>,
}

impl WireRecord {
    /// Returns the value of a wire field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the correlation id.
    pub fn correlation_id(&self) -> Option<&str> {
        self.get(CLIENT_ID_COLUMN)
    }
}

/// Why a single field could not be imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    /// The declared type has no wire form.
    UnsupportedType(FieldType),
    /// The raw value does not parse as the declared type.
    InvalidValue {
        /// Declared type.
        expected: FieldType,
        /// The raw wire value.
        value: String,
    },
}

/// A non-fatal per-field problem found while importing a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiagnostic {
    /// Local field name.
    pub field: String,
    /// What went wrong.
    pub kind: DiagnosticKind,
}

impl fmt::Display for FieldDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::UnsupportedType(ty) => {
                write!(f, "field {}: unsupported type {}", self.field, ty)
            }
            DiagnosticKind::InvalidValue { expected, value } => {
                write!(f, "field {}: {:?} is not a valid {}", self.field, value, expected)
            }
        }
    }
}

/// Outcome of importing one wire row into a value map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOutcome {
    /// True if at least one stored value changed.
    pub changed: bool,
    /// Per-field problems; the affected fields were left untouched.
    pub diagnostics: Vec<FieldDiagnostic>,
}

/// Converts between a table's local values and the tabular wire format.
///
/// The codec is driven entirely by the table's field definitions: export
/// walks them in order and import coerces each matching column to its
/// declared type. Reserved (`_`-prefixed) fields never cross the wire.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    fields: Vec<FieldDef>,
}

impl RecordCodec {
    /// Creates a codec for the given fields.
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    /// Returns the field definitions.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Exports a record for a push request.
    ///
    /// The output starts with `id` (empty until the server assigned one)
    /// and `client_id`, followed by every exportable field under its
    /// snake_case wire name. Missing values export as empty strings.
    pub fn export(
        &self,
        server_id: Option<i64>,
        correlation_id: &str,
        values: &BTreeMap<String, Value>,
    ) -> WireRecord {
        let mut fields = Vec::with_capacity(self.fields.len() + 2);
        fields.push((
            crate::read::ID_COLUMN.to_string(),
            server_id.filter(|id| *id != 0).map(|id| id.to_string()).unwrap_or_default(),
        ));
        fields.push((CLIENT_ID_COLUMN.to_string(), correlation_id.to_string()));

        for def in self.exportable() {
            let wire = values
                .get(&def.name)
                .and_then(Value::to_wire)
                .unwrap_or_default();
            fields.push((to_wire_name(&def.name), wire));
        }

        WireRecord { fields }
    }

    /// Imports one wire row into `target`.
    ///
    /// Only columns that map to a declared, non-reserved field are read.
    /// Values are written only when they differ from what `target` holds,
    /// so replaying the same row reports `changed == false`.
    pub fn import(
        &self,
        header: &[String],
        row: &[String],
        target: &mut BTreeMap<String, Value>,
    ) -> ImportOutcome {
        let mut outcome = ImportOutcome::default();
        let columns: Vec<String> = header.iter().map(|h| to_local_name(h)).collect();

        for def in self.fields.iter().filter(|d| !d.is_reserved()) {
            let Some(raw) = columns
                .iter()
                .position(|c| *c == def.name)
                .and_then(|i| row.get(i))
            else {
                continue;
            };

            match coerce(def.ty, raw) {
                Ok(value) => {
                    if target.get(&def.name) != Some(&value) {
                        target.insert(def.name.clone(), value);
                        outcome.changed = true;
                    }
                }
                Err(kind) => outcome.diagnostics.push(FieldDiagnostic {
                    field: def.name.clone(),
                    kind,
                }),
            }
        }

        outcome
    }

    fn exportable(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(|d| !d.is_reserved() && d.ty.has_wire_form())
    }
}

/// Coerces a raw wire value to a declared type.
///
/// Empty numeric and timestamp values become [`Value::Null`]. Booleans are
/// true only for a case-insensitive `"true"`.
pub fn coerce(ty: FieldType, raw: &str) -> Result<Value, DiagnosticKind> {
    let invalid = || DiagnosticKind::InvalidValue {
        expected: ty,
        value: raw.to_string(),
    };
    let trimmed = raw.trim();

    match ty {
        FieldType::String => Ok(Value::Text(raw.to_string())),
        FieldType::Bool => Ok(Value::Bool(trimmed.eq_ignore_ascii_case("true"))),
        _ if trimmed.is_empty() && ty.has_wire_form() => Ok(Value::Null),
        FieldType::Int => trimmed.parse().map(Value::Int).map_err(|_| invalid()),
        FieldType::Float => trimmed.parse().map(Value::Float).map_err(|_| invalid()),
        FieldType::Double => trimmed.parse().map(Value::Double).map_err(|_| invalid()),
        FieldType::Timestamp => timestamp::parse(trimmed)
            .map(Value::Timestamp)
            .map_err(|_| invalid()),
        FieldType::Binary | FieldType::List => Err(DiagnosticKind::UnsupportedType(ty)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn book_codec() -> RecordCodec {
        RecordCodec::new(vec![
            FieldDef::new("title", FieldType::String),
            FieldDef::new("pageCount", FieldType::Int),
            FieldDef::new("rating", FieldType::Float),
            FieldDef::new("price", FieldType::Double),
            FieldDef::new("available", FieldType::Bool),
            FieldDef::new("publishedAt", FieldType::Timestamp),
            FieldDef::new("cover", FieldType::Binary),
            FieldDef::new("_index", FieldType::Int),
        ])
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn export_layout() {
        let mut values = BTreeMap::new();
        values.insert("title".to_string(), Value::from("Dune"));
        values.insert("pageCount".to_string(), Value::Int(412));
        values.insert(
            "publishedAt".to_string(),
            Value::Timestamp(Utc.with_ymd_and_hms(1965, 8, 1, 0, 0, 0).unwrap()),
        );
        values.insert("_index".to_string(), Value::Int(3));

        let record = book_codec().export(None, "abc-123", &values);
        let names: Vec<&str> = record.fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "id",
                "client_id",
                "title",
                "page_count",
                "rating",
                "price",
                "available",
                "published_at"
            ]
        );
        assert_eq!(record.get("id"), Some(""));
        assert_eq!(record.correlation_id(), Some("abc-123"));
        assert_eq!(record.get("page_count"), Some("412"));
        assert_eq!(record.get("published_at"), Some("1965-08-01T00:00:00Z"));
        assert_eq!(record.get("rating"), Some(""));
    }

    #[test]
    fn export_with_server_id() {
        let record = book_codec().export(Some(42), "x", &BTreeMap::new());
        assert_eq!(record.get("id"), Some("42"));
    }

    #[test]
    fn import_coerces_declared_types() {
        let header = strings(&[
            "id",
            "title",
            "page_count",
            "rating",
            "price",
            "available",
            "published_at",
        ]);
        let row = strings(&[
            "1",
            "Dune",
            "412",
            "4.5",
            "9.99",
            "TRUE",
            "1965-08-01T00:00:00Z",
        ]);
        let mut values = BTreeMap::new();

        let outcome = book_codec().import(&header, &row, &mut values);
        assert!(outcome.changed);
        assert!(outcome.diagnostics.is_empty());
        assert_eq!(values["title"], Value::from("Dune"));
        assert_eq!(values["pageCount"], Value::Int(412));
        assert_eq!(values["rating"], Value::Float(4.5));
        assert_eq!(values["price"], Value::Double(9.99));
        assert_eq!(values["available"], Value::Bool(true));
        assert_eq!(
            values["publishedAt"],
            Value::Timestamp(Utc.with_ymd_and_hms(1965, 8, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn replay_is_unchanged() {
        let header = strings(&["id", "title", "page_count"]);
        let row = strings(&["1", "Dune", "412"]);
        let mut values = BTreeMap::new();
        let codec = book_codec();

        assert!(codec.import(&header, &row, &mut values).changed);
        assert!(!codec.import(&header, &row, &mut values).changed);
    }

    #[test]
    fn unsupported_type_is_diagnostic_only() {
        let header = strings(&["id", "cover", "title"]);
        let row = strings(&["1", "deadbeef", "Dune"]);
        let mut values = BTreeMap::new();

        let outcome = book_codec().import(&header, &row, &mut values);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(
            outcome.diagnostics[0].kind,
            DiagnosticKind::UnsupportedType(FieldType::Binary)
        );
        assert_eq!(values["title"], Value::from("Dune"));
        assert!(!values.contains_key("cover"));
    }

    #[test]
    fn invalid_value_keeps_previous() {
        let header = strings(&["id", "page_count"]);
        let mut values = BTreeMap::new();
        values.insert("pageCount".to_string(), Value::Int(10));

        let outcome = book_codec().import(&header, &strings(&["1", "many"]), &mut values);
        assert!(!outcome.changed);
        assert_eq!(values["pageCount"], Value::Int(10));
        assert!(outcome.diagnostics[0].to_string().contains("many"));
    }

    #[test]
    fn reserved_columns_are_ignored() {
        let header = strings(&["id", "_index"]);
        let mut values = BTreeMap::new();
        let outcome = book_codec().import(&header, &strings(&["1", "5"]), &mut values);
        assert!(!outcome.changed);
        assert!(values.is_empty());
    }

    #[test]
    fn coerce_empty_values() {
        assert_eq!(coerce(FieldType::Int, ""), Ok(Value::Null));
        assert_eq!(coerce(FieldType::Timestamp, " "), Ok(Value::Null));
        assert_eq!(coerce(FieldType::String, ""), Ok(Value::Text(String::new())));
        assert_eq!(coerce(FieldType::Bool, ""), Ok(Value::Bool(false)));
        assert_eq!(
            coerce(FieldType::List, ""),
            Err(DiagnosticKind::UnsupportedType(FieldType::List))
        );
    }
}
