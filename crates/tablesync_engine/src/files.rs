//! File attachment transfer.
//!
//! Tables may declare [`FileAttribute`]s whose paths are built from
//! templates. Rows in `pendingUpload` / `pendingDownload` are handed to a
//! [`BlobTransfer`] collaborator by `SyncController::sync_files`.

use async_trait::async_trait;
use tablesync_codec::WireRecord;
use tablesync_core::{FileAttribute, LocalId, Row};
use thiserror::Error;

/// Placeholder for the server id.
pub const ID_PLACEHOLDER: &str = "id";

/// Placeholder for the local id.
pub const CLIENT_ID_PLACEHOLDER: &str = "client_id";

/// One file to move.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTransfer {
    /// Table name.
    pub table: String,
    /// Attribute key.
    pub key: String,
    /// Rendered remote path.
    pub remote_path: String,
    /// Rendered local path.
    pub local_path: String,
    /// Remove the local copy after upload.
    pub delete_on_upload: bool,
    /// The owning record, exported; sent along with uploads.
    pub metadata: WireRecord,
}

impl FileTransfer {
    /// Builds the transfer for `attribute` of `row`.
    pub fn for_row(table: &str, attribute: &FileAttribute, row: &Row, metadata: WireRecord) -> Self {
        Self {
            table: table.to_string(),
            key: attribute.key.to_string(),
            remote_path: render_template(attribute.remote_template, row),
            local_path: render_template(attribute.local_template, row),
            delete_on_upload: attribute.delete_on_upload,
            metadata,
        }
    }
}

/// A failed file transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The local file does not exist.
    #[error("local file not found: {0}")]
    NotFound(String),
    /// The remote side rejected or lost the transfer.
    #[error("transfer failed: {0}")]
    Failed(String),
}

/// Moves attachment files between device and server.
#[async_trait]
pub trait BlobTransfer: Send + Sync {
    /// Uploads the local file to the remote path.
    async fn upload(&self, transfer: &FileTransfer) -> Result<(), TransferError>;

    /// Downloads the remote file to the local path.
    async fn download(&self, transfer: &FileTransfer) -> Result<(), TransferError>;
}

/// Outcome of one `sync_files` call.
#[derive(Debug, Default)]
pub struct FileSyncReport {
    /// Rows whose transfers all succeeded.
    pub completed: Vec<LocalId>,
    /// Rows with a failed transfer; they stay pending.
    pub failed: Vec<(LocalId, TransferError)>,
}

/// Renders a path template for `row`.
///
/// `{id}` becomes the server id (empty if unassigned), `{client_id}` the
/// local id and `{name}` the wire form of field `name`. Unknown
/// placeholders are kept verbatim.
pub fn render_template(template: &str, row: &Row) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match lookup(name, row) {
            Some(value) => out.push_str(&value),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn lookup(name: &str, row: &Row) -> Option<String> {
    match name {
        ID_PLACEHOLDER => Some(
            row.meta
                .server_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
        ),
        CLIENT_ID_PLACEHOLDER => Some(row.meta.local_id.to_string()),
        _ => row.values.get(name).and_then(|v| v.to_wire()),
    }
}
