//! Inspect-acks command implementation.

use serde::Serialize;
use std::fs;
use std::path::Path;
use tablesync_codec::{AckList, WriteAck};

/// Summary of a write acknowledgement body.
#[derive(Debug, Serialize)]
pub struct AckSummary {
    /// Accepted records.
    pub acks: Vec<WriteAck>,
    /// Lines that could not be decoded.
    pub rejected_lines: Vec<String>,
}

/// Runs the inspect-acks command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let body = fs::read_to_string(path)?;
    let summary = summarize(&body);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        _ => {
            println!("Write Acknowledgements");
            println!("======================");
            println!("Accepted: {}", summary.acks.len());
            for ack in &summary.acks {
                println!("  {:>10}  {}", ack.server_id, ack.correlation_id);
            }
            if !summary.rejected_lines.is_empty() {
                println!("Unreadable: {}", summary.rejected_lines.len());
                for line in &summary.rejected_lines {
                    println!("  {line}");
                }
            }
        }
    }

    Ok(())
}

/// Parses an acknowledgement body.
pub fn summarize(body: &str) -> AckSummary {
    let list = AckList::parse(body);
    AckSummary {
        acks: list.acks,
        rejected_lines: list.rejected_lines,
    }
}
