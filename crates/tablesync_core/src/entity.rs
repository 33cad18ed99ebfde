//! Compile-time entity descriptors.
//!
//! Application types describe their synchronized fields once, as a static
//! table of accessors. The codec and controller work from the derived
//! [`TableSchema`], so no runtime reflection is involved.
//!
//! ```
//! use tablesync_codec::{FieldType, Value};
//! use tablesync_core::{Field, SyncEntity, TableInfo, TablePermissions};
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Note {
//!     body: String,
//! }
//!
//! impl SyncEntity for Note {
//!     const TABLE: TableInfo = TableInfo::new("Note", 1);
//!     const FIELDS: &'static [Field<Self>] = &[Field::new(
//!         "body",
//!         FieldType::String,
//!         |n| Value::from(n.body.as_str()),
//!         |n, v| n.body = v.as_text().unwrap_or_default().to_string(),
//!     )];
//! }
//!
//! let note = Note { body: "hello".into() };
//! let values = note.to_values();
//! assert_eq!(Note::from_values(&values), note);
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tablesync_codec::{FieldDef, FieldType, RecordCodec, Value};

/// Which sync operations a table allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TablePermissions {
    /// Pull is allowed.
    pub read: bool,
    /// Push of created/updated records is allowed.
    pub write: bool,
    /// Push of deletions is allowed.
    pub delete: bool,
}

impl TablePermissions {
    /// All operations allowed.
    pub const ALL: Self = Self {
        read: true,
        write: true,
        delete: true,
    };

    /// Pull only.
    pub const READ_ONLY: Self = Self {
        read: true,
        write: false,
        delete: false,
    };
}

impl Default for TablePermissions {
    fn default() -> Self {
        Self::ALL
    }
}

/// A file attachment declared on a table.
///
/// Templates may reference `{field}` placeholders (local field names) and
/// the meta placeholders `{id}` (server id) and `{client_id}` (local id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileAttribute {
    /// Attribute key, unique per table.
    pub key: &'static str,
    /// Remote path template.
    pub remote_template: &'static str,
    /// Local path template.
    pub local_template: &'static str,
    /// Remove the local file once uploaded.
    pub delete_on_upload: bool,
}

impl FileAttribute {
    /// Creates a file attribute that keeps the local copy after upload.
    pub const fn new(
        key: &'static str,
        remote_template: &'static str,
        local_template: &'static str,
    ) -> Self {
        Self {
            key,
            remote_template,
            local_template,
            delete_on_upload: false,
        }
    }

    /// Removes the local copy after a successful upload.
    pub const fn delete_on_upload(mut self) -> Self {
        self.delete_on_upload = true;
        self
    }
}

/// Static description of a synchronized table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableInfo {
    /// Table name, unique per store.
    pub name: &'static str,
    /// Schema version; a change forces a full resync.
    pub version: u32,
    /// Server view the table is read through.
    pub view: &'static str,
    /// Allowed operations.
    pub permissions: TablePermissions,
    /// Whether reads require an access token.
    pub requires_auth: bool,
    /// File attachments.
    pub files: &'static [FileAttribute],
}

impl TableInfo {
    /// Creates a table description with full permissions, the default view
    /// and no authentication requirement.
    pub const fn new(name: &'static str, version: u32) -> Self {
        Self {
            name,
            version,
            view: "default",
            permissions: TablePermissions::ALL,
            requires_auth: false,
            files: &[],
        }
    }

    /// Sets the server view.
    pub const fn with_view(mut self, view: &'static str) -> Self {
        self.view = view;
        self
    }

    /// Sets the permissions.
    pub const fn with_permissions(mut self, permissions: TablePermissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Requires an access token for reads.
    pub const fn requiring_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    /// Declares file attachments.
    pub const fn with_files(mut self, files: &'static [FileAttribute]) -> Self {
        self.files = files;
        self
    }
}

/// One synchronized field of entity `T`.
pub struct Field<T> {
    /// Local (camelCase) field name.
    pub name: &'static str,
    /// Declared type.
    pub ty: FieldType,
    /// Reads the field.
    pub get: fn(&T) -> Value,
    /// Writes the field.
    pub set: fn(&mut T, Value),
}

impl<T> Field<T> {
    /// Creates a field descriptor.
    pub const fn new(
        name: &'static str,
        ty: FieldType,
        get: fn(&T) -> Value,
        set: fn(&mut T, Value),
    ) -> Self {
        Self { name, ty, get, set }
    }

    /// Returns the runtime field definition.
    pub fn def(&self) -> FieldDef {
        FieldDef::new(self.name, self.ty)
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .finish()
    }
}

/// A type stored in a synchronized table.
pub trait SyncEntity: Default + Send + Sync + 'static {
    /// Table description.
    const TABLE: TableInfo;

    /// Field descriptors, in export order.
    const FIELDS: &'static [Field<Self>];

    /// Reads every field into a value map keyed by local name.
    fn to_values(&self) -> BTreeMap<String, Value> {
        Self::FIELDS
            .iter()
            .map(|f| (f.name.to_string(), (f.get)(self)))
            .collect()
    }

    /// Builds an entity from a value map; missing fields keep their default.
    fn from_values(values: &BTreeMap<String, Value>) -> Self {
        let mut entity = Self::default();
        for field in Self::FIELDS {
            if let Some(value) = values.get(field.name) {
                (field.set)(&mut entity, value.clone());
            }
        }
        entity
    }
}

/// Runtime schema of a synchronized table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Schema version.
    pub version: u32,
    /// Server view.
    pub view: String,
    /// Allowed operations.
    pub permissions: TablePermissions,
    /// Whether reads require an access token.
    pub requires_auth: bool,
    /// Field definitions, in export order.
    pub fields: Vec<FieldDef>,
    /// File attachments.
    pub files: Vec<FileAttribute>,
}

impl TableSchema {
    /// Derives the schema of entity `T`.
    pub fn of<T: SyncEntity>() -> Self {
        Self::new(
            T::TABLE,
            T::FIELDS.iter().map(Field::def).collect(),
        )
    }

    /// Creates a schema from a table description and field list.
    pub fn new(info: TableInfo, fields: Vec<FieldDef>) -> Self {
        Self {
            name: info.name.to_string(),
            version: info.version,
            view: info.view.to_string(),
            permissions: info.permissions,
            requires_auth: info.requires_auth,
            fields,
            files: info.files.to_vec(),
        }
    }

    /// Returns a record codec for this schema.
    pub fn codec(&self) -> RecordCodec {
        RecordCodec::new(self.fields.clone())
    }

    /// Returns the field definition with the given local name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Track {
        title: String,
        plays: i64,
        cover: Vec<u8>,
    }

    const TRACK_FILES: &[FileAttribute] =
        &[FileAttribute::new("cover", "covers/{id}.png", "covers/{client_id}.png")];

    impl SyncEntity for Track {
        const TABLE: TableInfo = TableInfo::new("Track", 3)
            .with_view("public")
            .with_permissions(TablePermissions::READ_ONLY)
            .requiring_auth()
            .with_files(TRACK_FILES);
        const FIELDS: &'static [Field<Self>] = &[
            Field::new(
                "title",
                FieldType::String,
                |t| Value::from(t.title.as_str()),
                |t, v| t.title = v.as_text().unwrap_or_default().to_string(),
            ),
            Field::new(
                "plays",
                FieldType::Int,
                |t| Value::Int(t.plays),
                |t, v| t.plays = v.as_int().unwrap_or_default(),
            ),
            Field::new(
                "cover",
                FieldType::Binary,
                |t| Value::Bytes(t.cover.clone()),
                |t, v| {
                    if let Value::Bytes(b) = v {
                        t.cover = b;
                    }
                },
            ),
        ];
    }

    #[test]
    fn schema_from_descriptor() {
        let schema = TableSchema::of::<Track>();
        assert_eq!(schema.name, "Track");
        assert_eq!(schema.version, 3);
        assert_eq!(schema.view, "public");
        assert!(schema.requires_auth);
        assert!(!schema.permissions.write);
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.field("plays").map(|f| f.ty), Some(FieldType::Int));
        assert_eq!(schema.files[0].key, "cover");
    }

    #[test]
    fn values_round_trip() {
        let track = Track {
            title: "Intro".into(),
            plays: 4,
            cover: vec![1, 2],
        };
        let values = track.to_values();
        assert_eq!(values["plays"], Value::Int(4));
        assert_eq!(Track::from_values(&values), track);
    }

    #[test]
    fn missing_values_keep_defaults() {
        let mut values = BTreeMap::new();
        values.insert("title".to_string(), Value::from("Outro"));
        let track = Track::from_values(&values);
        assert_eq!(track.title, "Outro");
        assert_eq!(track.plays, 0);
    }

    #[test]
    fn field_debug_omits_accessors() {
        let debug = format!("{:?}", Track::FIELDS[0]);
        assert!(debug.contains("title"));
    }
}
