//! Core type definitions for synchronized records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tablesync_codec::Value;
use uuid::Uuid;

/// Server-assigned record identifier.
pub type ServerId = i64;

/// Client-generated record identifier.
///
/// Local ids:
/// - Are assigned when a record is created locally or first pulled
/// - Never change afterwards
/// - Serve as the correlation id on push, before a server id exists
///
/// Fresh ids are random v4 UUIDs. Ids minted elsewhere (for example by an
/// earlier client version) are accepted verbatim.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    /// Creates a new random local id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Creates a local id from an existing correlation id.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as sent in the `client_id` column.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for LocalId {
    fn from(id: &str) -> Self {
        Self::from_string(id)
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalId({})", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Synchronization status of a record.
///
/// Statuses move toward `Current` as the server confirms changes; a local
/// mutation re-dirties a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    /// In sync with the server.
    Current,
    /// Created locally, never pushed.
    Created,
    /// Modified locally since the last push.
    Updated,
    /// Deleted locally, deletion not yet pushed.
    Deleted,
    /// File attachments waiting to be uploaded.
    PendingUpload,
    /// File attachments waiting to be downloaded.
    PendingDownload,
}

impl SyncStatus {
    /// Returns true if the record must be included in a write sync.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        matches!(self, SyncStatus::Created | SyncStatus::Updated)
    }

    /// Returns the status name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Current => "current",
            SyncStatus::Created => "created",
            SyncStatus::Updated => "updated",
            SyncStatus::Deleted => "deleted",
            SyncStatus::PendingUpload => "pendingUpload",
            SyncStatus::PendingDownload => "pendingDownload",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronization metadata carried by every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMeta {
    /// Immutable client id.
    pub local_id: LocalId,
    /// Server id, absent until the first successful push or pull.
    pub server_id: Option<ServerId>,
    /// Current sync status.
    pub status: SyncStatus,
    /// Set when the server reported a deletion that is not yet purged.
    pub soft_deleted: bool,
}

impl SyncMeta {
    /// Metadata for a record created locally.
    #[must_use]
    pub fn created() -> Self {
        Self {
            local_id: LocalId::new(),
            server_id: None,
            status: SyncStatus::Created,
            soft_deleted: false,
        }
    }

    /// Metadata for a record first seen in a pull.
    #[must_use]
    pub fn pulled(server_id: ServerId) -> Self {
        Self {
            local_id: LocalId::new(),
            server_id: Some(server_id),
            status: SyncStatus::Current,
            soft_deleted: false,
        }
    }

    /// Returns true if the server has ever acknowledged this record.
    #[must_use]
    pub fn is_known_to_server(&self) -> bool {
        self.server_id.is_some_and(|id| id != 0)
    }
}

/// One untyped row of a synchronized table.
///
/// `values` is keyed by local (camelCase) field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Sync metadata.
    pub meta: SyncMeta,
    /// Field values.
    pub values: BTreeMap<String, Value>,
}

impl Row {
    /// Creates a row with the given metadata and values.
    #[must_use]
    pub fn new(meta: SyncMeta, values: BTreeMap<String, Value>) -> Self {
        Self { meta, values }
    }

    /// Returns the local id.
    #[must_use]
    pub fn local_id(&self) -> &LocalId {
        &self.meta.local_id
    }

    /// Returns the server id.
    #[must_use]
    pub fn server_id(&self) -> Option<ServerId> {
        self.meta.server_id
    }

    /// Returns true if the row is visible to application code.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.meta.soft_deleted && self.meta.status != SyncStatus::Deleted
    }
}
