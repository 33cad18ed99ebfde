//! Error types for the sync engine.

use crate::transport::TransportError;
use tablesync_codec::CodecError;
use tablesync_core::{LockKind, StoreError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Missing or rejected credentials, a 403, or an operation the table
    /// does not allow.
    #[error("permission denied for table {table}: {reason}")]
    Permission {
        /// Table name.
        table: String,
        /// Why access was denied.
        reason: String,
    },

    /// The table's lease for this operation is already held.
    #[error("{kind} lock on table {table} is held")]
    Lock {
        /// Table name.
        table: String,
        /// Which lock.
        kind: LockKind,
    },

    /// The request never produced a response.
    #[error("network connection failed: {0}")]
    NetworkConnection(#[from] TransportError),

    /// The server answered with an unexpected status.
    #[error("server returned status {status} for table {table}")]
    Server {
        /// Table name.
        table: String,
        /// HTTP status code.
        status: u16,
    },

    /// A read response could not be parsed.
    #[error("malformed response for table {table}: {source}")]
    MalformedResponse {
        /// Table name.
        table: String,
        /// Parse failure.
        source: CodecError,
    },

    /// No session is available where one is required.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The local store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The table was never passed to `configure`.
    #[error("table {0} is not configured")]
    TableNotConfigured(String),
}

impl SyncError {
    /// Creates a permission error.
    pub fn permission(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permission {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Returns true if a later attempt may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Lock { .. } | SyncError::NetworkConnection(_) | SyncError::Server { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::NetworkConnection(TransportError::Timeout).is_retryable());
        assert!(SyncError::Server {
            table: "Book".into(),
            status: 500
        }
        .is_retryable());
        assert!(SyncError::Lock {
            table: "Book".into(),
            kind: LockKind::Read
        }
        .is_retryable());
        assert!(!SyncError::permission("Book", "forbidden").is_retryable());
        assert!(!SyncError::authentication("no session").is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::Lock {
            table: "Book".into(),
            kind: LockKind::Write,
        };
        assert_eq!(err.to_string(), "write lock on table Book is held");

        let err = SyncError::MalformedResponse {
            table: "Book".into(),
            source: CodecError::MissingHeader,
        };
        assert!(err.to_string().starts_with("malformed response for table Book"));
    }
}
