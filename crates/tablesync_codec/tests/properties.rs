//! Property tests for the wire codec.

use proptest::prelude::*;
use tablesync_codec::{to_local_name, to_wire_name, AckList, ReadPayload};

proptest! {
    #[test]
    fn read_parse_never_panics(body in ".{0,256}") {
        let _ = ReadPayload::parse(&body);
    }

    #[test]
    fn ack_parse_never_panics(body in ".{0,256}") {
        let _ = AckList::parse(&body);
    }

    #[test]
    fn snake_case_names_round_trip(name in "[a-z]{1,8}(_[a-z]{1,8}){0,3}") {
        prop_assert_eq!(to_wire_name(&to_local_name(&name)), name);
    }

    #[test]
    fn rows_match_header_width(
        ids in prop::collection::vec(1i64..1_000_000, 0..20),
        title in "[a-zA-Z ]{0,12}",
    ) {
        let mut body = String::from("meta|2024-05-01T08:30:00Z\nid|title\n");
        for id in &ids {
            body.push_str(&format!("{id}|{title}\n"));
        }
        let payload = ReadPayload::parse(&body).unwrap();
        prop_assert_eq!(payload.rows.len(), ids.len());
        for (row, id) in payload.rows.iter().zip(&ids) {
            prop_assert_eq!(row.server_id, *id);
            prop_assert_eq!(row.values.len(), 2);
        }
    }
}
