//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while decoding a wire payload.
///
/// Every variant means the payload as a whole cannot be trusted. Per-field
/// coercion problems are not errors; they are reported as
/// [`crate::FieldDiagnostic`]s and decoding continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The payload has no metadata line.
    #[error("missing metadata line")]
    MissingMetadata,

    /// The metadata line does not carry a usable watermark at index 1.
    #[error("invalid watermark in metadata: {value:?}")]
    InvalidWatermark {
        /// The raw metadata field (empty when absent).
        value: String,
    },

    /// The payload has no header line.
    #[error("missing header line")]
    MissingHeader,

    /// The header does not name an `id` column.
    #[error("header has no id column")]
    MissingIdColumn,

    /// A record line has fewer columns than the header.
    #[error("line {line}: expected {expected} columns, found {found}")]
    RowTooShort {
        /// Zero-based line number in the payload.
        line: usize,
        /// Number of header columns.
        expected: usize,
        /// Number of columns on the line.
        found: usize,
    },

    /// A record's `id` column is not an integer.
    #[error("line {line}: invalid server id {value:?}")]
    InvalidServerId {
        /// Zero-based line number in the payload.
        line: usize,
        /// The raw id value.
        value: String,
    },

    /// A timestamp does not match the fixed UTC wire format.
    #[error("invalid timestamp {value:?}")]
    InvalidTimestamp {
        /// The raw timestamp string.
        value: String,
    },
}

impl CodecError {
    /// Creates an invalid watermark error.
    pub fn invalid_watermark(value: impl Into<String>) -> Self {
        Self::InvalidWatermark {
            value: value.into(),
        }
    }

    /// Creates an invalid timestamp error.
    pub fn invalid_timestamp(value: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            value: value.into(),
        }
    }
}
