//! # TableSync Engine
//!
//! Offline-first synchronization of local tables with a tabular HTTP
//! backend.
//!
//! The engine pushes local creations, updates and deletions and pulls
//! remote changes since a per-table watermark. Each of the three operations
//! of a table runs under its own TTL lease, so a crashed sync never wedges a
//! table for longer than the TTL.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  SyncRequest   ┌──────────────┐
//! │  SyncController  │ ─────────────> │  HttpClient  │
//! │                  │ <───────────── │              │
//! └──────────────────┘  HttpResponse  └──────────────┘
//!          │ leases, apply
//!          v
//! ┌──────────────────┐
//! │    LocalStore    │
//! └──────────────────┘
//! ```
//!
//! Transport, authentication, file transfer and application callbacks are
//! all collaborators behind traits ([`HttpClient`], [`AuthProvider`],
//! [`BlobTransfer`], [`SyncHooks`]).
//!
//! ## Guarantees
//!
//! - A read response is applied completely, together with its watermark, or
//!   not at all
//! - Only records the server acknowledged leave the dirty states
//! - Only `sync_table` retries; every other operation fails fast

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod auth;
mod config;
mod controller;
mod error;
mod files;
mod hooks;
mod lease;
mod transport;

pub use auth::{AuthProvider, NoSession, StaticTokenProvider};
pub use config::{RetryConfig, SyncConfig};
pub use controller::{SyncController, SyncReport, SyncStats, TableReport};
pub use error::{SyncError, SyncResult};
pub use files::{
    render_template, BlobTransfer, FileSyncReport, FileTransfer, TransferError,
    CLIENT_ID_PLACEHOLDER, ID_PLACEHOLDER,
};
pub use hooks::{NoopHooks, SyncHooks};
pub use lease::{Lease, LeaseManager};
pub use transport::{
    AccessToken, HttpClient, HttpResponse, MockHttpClient, PushRequest, ReadRequest, SyncRequest,
    TableTarget, TransportError,
};
