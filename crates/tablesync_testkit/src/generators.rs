//! Property-based test generators using proptest.
//!
//! Text strategies never produce the column separator or line breaks, so
//! generated values survive the wire format unchanged.

use crate::fixtures::{base_time, Book};
use chrono::{DateTime, Utc};
use proptest::prelude::*;

/// Strategy for wire-safe text.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9 ,.'-]{0,24}").expect("Invalid regex")
}

/// Strategy for whole-second timestamps in 2024.
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..31_536_000).prop_map(base_time)
}

/// Strategy for books whose values survive a wire round trip.
///
/// Ratings are multiples of 0.5 so their decimal form is exact.
pub fn book_strategy() -> impl Strategy<Value = Book> {
    (
        text_strategy(),
        text_strategy(),
        prop::option::of(0i64..5000),
        (0u8..=10).prop_map(|half_stars| f64::from(half_stars) / 2.0),
        prop::option::of(timestamp_strategy()),
        any::<i64>(),
    )
        .prop_map(
            |(title, author, page_count, rating, published_at, shelf)| Book {
                title,
                author,
                page_count,
                rating,
                published_at,
                shelf,
            },
        )
}

/// A mutation made by the local application.
#[derive(Debug, Clone)]
pub enum LocalOp {
    /// Insert a new book.
    Insert(Book),
    /// Update the n-th live book, modulo the live count.
    Update(usize, Book),
    /// Delete the n-th live book, modulo the live count.
    Delete(usize),
}

/// Strategy for one local mutation.
pub fn local_op_strategy() -> impl Strategy<Value = LocalOp> {
    prop_oneof![
        3 => book_strategy().prop_map(LocalOp::Insert),
        2 => (any::<usize>(), book_strategy()).prop_map(|(i, b)| LocalOp::Update(i, b)),
        1 => any::<usize>().prop_map(LocalOp::Delete),
    ]
}

/// Strategy for a sequence of local mutations.
pub fn local_ops_strategy(max: usize) -> impl Strategy<Value = Vec<LocalOp>> {
    prop::collection::vec(local_op_strategy(), 0..max)
}

/// A mutation made by another client, directly on the server.
#[derive(Debug, Clone)]
pub enum RemoteOp {
    /// Insert a row with this title.
    Insert(String),
    /// Retitle the n-th server row, modulo the row count.
    Retitle(usize, String),
    /// Delete the n-th server row, modulo the row count.
    Delete(usize),
}

/// Strategy for one remote mutation.
pub fn remote_op_strategy() -> impl Strategy<Value = RemoteOp> {
    prop_oneof![
        3 => text_strategy().prop_map(RemoteOp::Insert),
        2 => (any::<usize>(), text_strategy()).prop_map(|(i, t)| RemoteOp::Retitle(i, t)),
        1 => any::<usize>().prop_map(RemoteOp::Delete),
    ]
}

/// Strategy for a sequence of remote mutations.
pub fn remote_ops_strategy(max: usize) -> impl Strategy<Value = Vec<RemoteOp>> {
    prop::collection::vec(remote_op_strategy(), 0..max)
}
