//! Read (pull) response decoding.
//!
//! ```text
//! line 0: metadata, pipe-delimited; field[1] = new watermark
//! line 1: header, pipe-delimited wire names; must include "id", may include "delete"
//! line 2..N: one record per line, positionally aligned to the header
//! ```

use crate::error::{CodecError, CodecResult};
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Column separator.
pub const SEPARATOR: char = '|';

/// Wire name of the server id column.
pub const ID_COLUMN: &str = "id";

/// Wire name of the deletion flag column.
pub const DELETE_COLUMN: &str = "delete";

/// One record line of a read response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadRow {
    /// Server id from the `id` column.
    pub server_id: i64,
    /// True when the `delete` column equals `true`.
    pub deleted: bool,
    /// Raw column values, aligned to [`ReadPayload::header`].
    pub values: Vec<String>,
}

/// A fully parsed read response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadPayload {
    /// Raw metadata fields from line 0.
    pub metadata: Vec<String>,
    /// The new watermark to store once the payload is applied.
    pub watermark: DateTime<Utc>,
    /// Wire names from line 1.
    pub header: Vec<String>,
    /// Record lines.
    pub rows: Vec<ReadRow>,
}

impl ReadPayload {
    /// Parses a read response body.
    ///
    /// Parsing is all-or-nothing: any structural problem fails the whole
    /// payload so the caller never applies a partial response. Blank lines
    /// (including a trailing newline) are ignored and `\r` line endings are
    /// tolerated.
    pub fn parse(body: &str) -> CodecResult<Self> {
        let mut lines = body
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());

        let (_, meta_line) = lines.next().ok_or(CodecError::MissingMetadata)?;
        let metadata: Vec<String> = split(meta_line);
        let raw_watermark = metadata.get(1).cloned().unwrap_or_default();
        let watermark = timestamp::parse(&raw_watermark)
            .map_err(|_| CodecError::invalid_watermark(raw_watermark))?;

        let (_, header_line) = lines.next().ok_or(CodecError::MissingHeader)?;
        let header: Vec<String> = split(header_line)
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();
        let id_index = header
            .iter()
            .position(|h| h == ID_COLUMN)
            .ok_or(CodecError::MissingIdColumn)?;
        let delete_index = header.iter().position(|h| h == DELETE_COLUMN);

        let mut rows = Vec::new();
        for (line_no, line) in lines {
            let values = split(line);
            if values.len() < header.len() {
                return Err(CodecError::RowTooShort {
                    line: line_no,
                    expected: header.len(),
                    found: values.len(),
                });
            }

            let raw_id = values[id_index].trim();
            let server_id = raw_id
                .parse::<i64>()
                .map_err(|_| CodecError::InvalidServerId {
                    line: line_no,
                    value: raw_id.to_string(),
                })?;
            let deleted = delete_index.is_some_and(|i| values[i] == "true");

            rows.push(ReadRow {
                server_id,
                deleted,
                values,
            });
        }

        Ok(Self {
            metadata,
            watermark,
            header,
            rows,
        })
    }

    /// Returns the raw value of `column` in `row`.
    pub fn value<'a>(&self, row: &'a ReadRow, column: &str) -> Option<&'a str> {
        self.header
            .iter()
            .position(|h| h == column)
            .and_then(|i| row.values.get(i))
            .map(String::as_str)
    }
}

fn split(line: &str) -> Vec<String> {
    line.split(SEPARATOR).map(str::to_string).collect()
}
