//! Write (push) acknowledgement decoding.
//!
//! The server answers a push with one `serverId|correlationId` line per
//! accepted record. Some servers prepend a header line (`id|clientId`);
//! it is recognised by its non-numeric first column and skipped.

use crate::read::SEPARATOR;
use serde::Serialize;

/// One accepted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteAck {
    /// The server id assigned to the record.
    pub server_id: i64,
    /// The client correlation id the record was sent with.
    pub correlation_id: String,
}

/// Result of decoding an acknowledgement body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AckList {
    /// Accepted records, in response order.
    pub acks: Vec<WriteAck>,
    /// Lines that could not be decoded (excluding a leading header).
    pub rejected_lines: Vec<String>,
}

impl AckList {
    /// Parses an acknowledgement body. Never fails: bad lines are collected
    /// in `rejected_lines` so a partially readable response still confirms
    /// what it can.
    pub fn parse(body: &str) -> Self {
        let mut list = AckList::default();

        let lines = body
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .filter(|l| !l.trim().is_empty());

        for (i, line) in lines.enumerate() {
            match parse_line(line) {
                Some(ack) => list.acks.push(ack),
                None if i == 0 => {}
                None => list.rejected_lines.push(line.to_string()),
            }
        }

        list
    }

    /// Returns true if nothing was acknowledged.
    pub fn is_empty(&self) -> bool {
        self.acks.is_empty()
    }
}

fn parse_line(line: &str) -> Option<WriteAck> {
    let mut parts = line.splitn(2, SEPARATOR);
    let server_id = parts.next()?.trim().parse::<i64>().ok()?;
    let correlation_id = parts.next().unwrap_or("").trim().to_string();
    Some(WriteAck {
        server_id,
        correlation_id,
    })
}
