//! Fixed UTC timestamp format used on the wire.
//!
//! Watermarks and timestamp fields travel as `YYYY-MM-DDTHH:MM:SSZ`.
//! Sub-second precision is not carried.

use crate::error::{CodecError, CodecResult};
use chrono::{DateTime, NaiveDateTime, Utc};

/// The wire timestamp format.
pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Formats a timestamp for the wire.
pub fn format(ts: &DateTime<Utc>) -> String {
    ts.format(WIRE_FORMAT).to_string()
}

/// Parses a wire timestamp.
pub fn parse(value: &str) -> CodecResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), WIRE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| CodecError::invalid_timestamp(value))
}

/// The "distant past": unlocked leases and never-synced tables.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_wire_timestamp() {
        let ts = parse("2024-01-01T00:00:00Z").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn format_drops_subseconds() {
        let ts = Utc.with_ymd_and_hms(2023, 6, 30, 12, 5, 9).unwrap()
            + chrono::Duration::milliseconds(250);
        assert_eq!(format(&ts), "2023-06-30T12:05:09Z");
    }

    #[test]
    fn rejects_other_formats() {
        assert!(parse("2024-01-01").is_err());
        assert!(parse("2024-01-01 00:00:00").is_err());
        assert!(parse("").is_err());
        assert!(matches!(
            parse("nope"),
            Err(CodecError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn epoch_is_unix_zero() {
        assert_eq!(epoch().timestamp(), 0);
        assert_eq!(format(&epoch()), "1970-01-01T00:00:00Z");
    }
}
