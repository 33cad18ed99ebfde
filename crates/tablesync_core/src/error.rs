//! Error types for the local store.

use crate::types::LocalId;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in local store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record with the given local id exists.
    #[error("record {local_id} not found in table {table}")]
    RecordNotFound {
        /// Table name.
        table: String,
        /// The local id that was not found.
        local_id: LocalId,
    },

    /// Another record in the table already holds this server id.
    #[error("server id {server_id} already assigned in table {table}")]
    DuplicateServerId {
        /// Table name.
        table: String,
        /// The conflicting server id.
        server_id: i64,
    },

    /// The operation is not valid for the record's current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of the problem.
        message: String,
    },

    /// The transaction was aborted by its closure.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

impl StoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an aborted transaction error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }
}
