//! CLI command implementations.

pub mod inspect_acks;
pub mod inspect_read;
pub mod timestamp;
