//! Timestamp command implementation.

use tablesync_codec::timestamp;

/// Runs the timestamp command.
pub fn run(value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = timestamp::parse(value)?;
    println!("valid: {}", timestamp::format(&parsed));
    println!("unix:  {}", parsed.timestamp());
    Ok(())
}
