//! # TableSync Testkit
//!
//! Test utilities for TableSync.
//!
//! This crate provides:
//! - A sample `Book` entity and wiring helpers for controllers
//! - Response body builders for scripted transports
//! - A loopback [`FakeServer`] that behaves like a tabular backend
//! - Recording collaborators for hooks and file transfers
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tablesync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn pushes_new_books() {
//!     let server = Arc::new(FakeServer::new().with_table("Book", BOOK_COLUMNS));
//!     let env = TestEnv::with_server(server.clone());
//!     env.books().insert(&Book::titled("Dune")).unwrap();
//!     env.controller.write_sync("Book", Some(&token())).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod server;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::server::*;
}

pub use fixtures::*;
pub use generators::*;
pub use server::*;
