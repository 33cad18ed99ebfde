//! # TableSync Core
//!
//! Data model and local store contract for TableSync.
//!
//! This crate provides:
//! - Record identity and sync metadata ([`LocalId`], [`SyncStatus`], [`SyncMeta`], [`Row`])
//! - Compile-time entity descriptors ([`SyncEntity`], [`Field`], [`TableSchema`])
//! - Per-table synchronization state with TTL locks ([`SyncTableState`])
//! - The [`LocalStore`] trait and its transaction type
//! - An in-memory reference store and a typed [`Table`] handle
//!
//! ## Key Invariants
//!
//! - A record's local id never changes
//! - A server id, once assigned, is unique per table
//! - All mutations happen inside one store transaction

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod memory;
mod store;
mod table;
mod table_state;
mod types;

pub use entity::{Field, FileAttribute, SyncEntity, TableInfo, TablePermissions, TableSchema};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use store::{LocalStore, PendingWrite, StoreView, Transaction, TransactionWrites};
pub use table::{Record, Table};
pub use table_state::{LockKind, SyncTableState};
pub use types::{LocalId, Row, ServerId, SyncMeta, SyncStatus};
