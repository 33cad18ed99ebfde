//! # TableSync Codec
//!
//! Tabular wire format for TableSync.
//!
//! The server speaks a line-oriented, pipe-delimited format:
//!
//! - **Read responses** carry a metadata line (with the new watermark), a
//!   header line of snake_case column names and one line per record.
//! - **Write acknowledgements** carry one `serverId|correlationId` line per
//!   accepted record.
//! - **Push records** are exported as ordered `(wire name, value)` pairs.
//!
//! Local field names are camelCase; [`to_wire_name`] and [`to_local_name`]
//! convert between the two conventions.
//!
//! ## Usage
//!
//! ```
//! use tablesync_codec::ReadPayload;
//!
//! let body = "meta|2024-01-01T00:00:00Z\nid|title\n1|Dune";
//! let payload = ReadPayload::parse(body).unwrap();
//! assert_eq!(payload.rows.len(), 1);
//! assert_eq!(payload.value(&payload.rows[0], "title"), Some("Dune"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ack;
mod error;
mod names;
mod read;
mod record;
pub mod timestamp;
mod value;

pub use ack::{AckList, WriteAck};
pub use error::{CodecError, CodecResult};
pub use names::{to_local_name, to_wire_name};
pub use read::{ReadPayload, ReadRow, DELETE_COLUMN, ID_COLUMN, SEPARATOR};
pub use record::{
    coerce, DiagnosticKind, FieldDiagnostic, ImportOutcome, RecordCodec, WireRecord,
    CLIENT_ID_COLUMN,
};
pub use value::{FieldDef, FieldType, Value, RESERVED_PREFIX};
