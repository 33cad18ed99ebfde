//! Field name conversion between local and wire conventions.
//!
//! Local field names are camelCase, wire names are snake_case.

/// Converts a local camelCase name to its snake_case wire name.
pub fn to_wire_name(local: &str) -> String {
    let mut out = String::with_capacity(local.len() + 4);
    for (i, ch) in local.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Converts a snake_case wire name to its local camelCase name.
pub fn to_local_name(wire: &str) -> String {
    let mut out = String::with_capacity(wire.len());
    let mut upper_next = false;
    for ch in wire.trim().chars() {
        if ch == '_' && !out.is_empty() {
            upper_next = true;
        } else if upper_next {
            out.push(ch.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}
