//! Test fixtures and controller helpers.
//!
//! Provides a sample entity, response body builders and a ready-wired
//! controller over an in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tablesync_codec::{timestamp, FieldType, Value};
use tablesync_core::{
    Field, FileAttribute, InMemoryStore, LocalStore, SyncEntity, SyncTableState, Table, TableInfo,
    TableSchema,
};
use tablesync_engine::{
    AccessToken, AuthProvider, BlobTransfer, FileTransfer, HttpClient, MockHttpClient,
    RetryConfig, StaticTokenProvider, SyncConfig, SyncController, SyncHooks, TransferError,
};

/// File attachments of [`Book`].
pub const BOOK_FILES: &[FileAttribute] =
    &[FileAttribute::new("cover", "covers/{id}.jpg", "cache/{client_id}.jpg").delete_on_upload()];

/// Wire columns of [`Book`], excluding `id` and `client_id`.
pub const BOOK_COLUMNS: &[&str] = &["title", "author", "page_count", "rating", "published_at"];

/// A sample synchronized entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Book {
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Page count, if known.
    pub page_count: Option<i64>,
    /// Average rating.
    pub rating: f64,
    /// Publication time, if known.
    pub published_at: Option<DateTime<Utc>>,
    /// Local-only shelf position.
    pub shelf: i64,
}

impl Book {
    /// Creates a book with only a title.
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }
}

impl SyncEntity for Book {
    const TABLE: TableInfo = TableInfo::new("Book", 1)
        .with_view("catalog")
        .with_files(BOOK_FILES);

    const FIELDS: &'static [Field<Self>] = &[
        Field::new(
            "title",
            FieldType::String,
            |b| Value::from(b.title.as_str()),
            |b, v| b.title = v.as_text().unwrap_or_default().to_string(),
        ),
        Field::new(
            "author",
            FieldType::String,
            |b| Value::from(b.author.as_str()),
            |b, v| b.author = v.as_text().unwrap_or_default().to_string(),
        ),
        Field::new(
            "pageCount",
            FieldType::Int,
            |b| b.page_count.map(Value::Int).unwrap_or(Value::Null),
            |b, v| b.page_count = v.as_int(),
        ),
        Field::new(
            "rating",
            FieldType::Double,
            |b| Value::Double(b.rating),
            |b, v| b.rating = v.as_double().unwrap_or_default(),
        ),
        Field::new(
            "publishedAt",
            FieldType::Timestamp,
            |b| b.published_at.map(Value::Timestamp).unwrap_or(Value::Null),
            |b, v| b.published_at = v.as_timestamp(),
        ),
        Field::new(
            "_shelf",
            FieldType::Int,
            |b| Value::Int(b.shelf),
            |b, v| b.shelf = v.as_int().unwrap_or_default(),
        ),
    ];
}

/// Returns the schema of [`Book`].
pub fn book_schema() -> TableSchema {
    TableSchema::of::<Book>()
}

/// Returns a test access token.
pub fn token() -> AccessToken {
    AccessToken::new("test-token")
}

/// Builds a read response body.
///
/// `header` lists the wire columns; each row is given as raw values aligned
/// to it.
pub fn read_body(watermark: &str, header: &[&str], rows: &[&[&str]]) -> String {
    let mut lines = vec![format!("meta|{watermark}"), header.join("|")];
    lines.extend(rows.iter().map(|row| row.join("|")));
    lines.join("\n")
}

/// Builds a write acknowledgement body with a header line.
pub fn ack_body(acks: &[(i64, &str)]) -> String {
    let mut lines = vec!["id|clientId".to_string()];
    lines.extend(acks.iter().map(|(id, client)| format!("{id}|{client}")));
    lines.join("\n")
}

/// Sets a persisted lock timestamp directly, e.g. to simulate a crashed
/// sync that never released its lease.
pub fn stamp_lock(
    store: &InMemoryStore,
    table: &str,
    kind: tablesync_core::LockKind,
    at: DateTime<Utc>,
) {
    store
        .transaction(|txn| {
            let mut state = txn_state(txn, table);
            state.set_lock(kind, at);
            txn.put_table_state(state);
            Ok(())
        })
        .expect("failed to stamp lock");
}

/// Sets the stored watermark directly.
pub fn stamp_watermark(store: &InMemoryStore, table: &str, at: Option<DateTime<Utc>>) {
    store
        .transaction(|txn| {
            let mut state = txn_state(txn, table);
            state.last_server_sync = at;
            txn.put_table_state(state);
            Ok(())
        })
        .expect("failed to stamp watermark");
}

fn txn_state(txn: &tablesync_core::Transaction<'_>, table: &str) -> SyncTableState {
    use tablesync_core::StoreView;
    txn.table_state(table).expect("table is not configured")
}

/// A wire timestamp `seconds` after 2024-01-01T00:00:00Z.
pub fn wire_time(seconds: i64) -> String {
    timestamp::format(&base_time(seconds))
}

/// 2024-01-01T00:00:00Z plus `seconds`.
pub fn base_time(seconds: i64) -> DateTime<Utc> {
    timestamp::parse("2024-01-01T00:00:00Z").expect("valid base time")
        + chrono::Duration::seconds(seconds)
}

/// A configuration with fast retries for tests.
pub fn fast_config() -> SyncConfig {
    SyncConfig::new().with_retry(RetryConfig::new(3, Duration::from_millis(5)))
}

/// A controller over an in-memory store, with the `Book` table configured.
pub struct TestEnv<H: HttpClient + 'static> {
    /// The local store.
    pub store: Arc<InMemoryStore>,
    /// The transport.
    pub http: Arc<H>,
    /// The controller under test.
    pub controller: SyncController<InMemoryStore>,
}

impl TestEnv<MockHttpClient> {
    /// Creates an environment with a scripted transport and a valid token.
    pub fn mock() -> Self {
        Self::mock_with(fast_config())
    }

    /// Creates an environment with a scripted transport and `config`.
    pub fn mock_with(config: SyncConfig) -> Self {
        Self::build(
            Arc::new(MockHttpClient::new()),
            Arc::new(StaticTokenProvider::new("test-token")),
            config,
        )
    }
}

impl<H: HttpClient + 'static> TestEnv<H> {
    /// Creates an environment over any transport.
    pub fn build(http: Arc<H>, auth: Arc<dyn AuthProvider>, config: SyncConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let controller = SyncController::new(
            Arc::clone(&store),
            Arc::clone(&http) as Arc<dyn HttpClient>,
            auth,
            config,
        );
        controller
            .configure([book_schema()])
            .expect("failed to configure Book");
        Self {
            store,
            http,
            controller,
        }
    }

    /// Replaces the controller, keeping store and transport.
    pub fn map_controller(
        mut self,
        f: impl FnOnce(SyncController<InMemoryStore>) -> SyncController<InMemoryStore>,
    ) -> Self {
        self.controller = f(self.controller);
        self
    }

    /// Returns a typed handle on the `Book` table.
    pub fn books(&self) -> Table<InMemoryStore, Book> {
        Table::new(Arc::clone(&self.store))
    }

    /// Returns the stored `Book` state.
    pub fn book_state(&self) -> SyncTableState {
        self.controller
            .table_state("Book")
            .expect("Book is not configured")
    }
}

/// Hooks that record every callback.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    forbidden: Mutex<Vec<String>>,
}

impl RecordingHooks {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tables reported as forbidden, in call order.
    pub fn forbidden_tables(&self) -> Vec<String> {
        self.forbidden.lock().clone()
    }
}

impl SyncHooks for RecordingHooks {
    fn forbidden(&self, table: &str) {
        self.forbidden.lock().push(table.to_string());
    }
}

/// A file transfer collaborator that records transfers and fails on
/// request.
#[derive(Debug, Default)]
pub struct RecordingBlobs {
    uploads: Mutex<Vec<FileTransfer>>,
    downloads: Mutex<Vec<FileTransfer>>,
    failing: Mutex<HashMap<String, TransferError>>,
}

impl RecordingBlobs {
    /// Creates a recorder where every transfer succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes transfers involving `path` (local or remote) fail.
    pub fn fail_path(&self, path: &str, error: TransferError) {
        self.failing.lock().insert(path.to_string(), error);
    }

    /// Returns recorded uploads.
    pub fn uploads(&self) -> Vec<FileTransfer> {
        self.uploads.lock().clone()
    }

    /// Returns recorded downloads.
    pub fn downloads(&self) -> Vec<FileTransfer> {
        self.downloads.lock().clone()
    }

    fn check(&self, transfer: &FileTransfer) -> Result<(), TransferError> {
        let failing = self.failing.lock();
        match failing
            .get(&transfer.local_path)
            .or_else(|| failing.get(&transfer.remote_path))
        {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BlobTransfer for RecordingBlobs {
    async fn upload(&self, transfer: &FileTransfer) -> Result<(), TransferError> {
        self.uploads.lock().push(transfer.clone());
        self.check(transfer)
    }

    async fn download(&self, transfer: &FileTransfer) -> Result<(), TransferError> {
        self.downloads.lock().push(transfer.clone());
        self.check(transfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablesync_codec::ReadPayload;

    #[test]
    fn book_schema_exports_wire_columns() {
        let schema = book_schema();
        assert_eq!(schema.name, "Book");
        assert_eq!(schema.view, "catalog");

        let record = schema
            .codec()
            .export(None, "c1", &Book::titled("Dune").to_values());
        let names: Vec<&str> = record.fields.iter().map(|(k, _)| k.as_str()).collect();
        let mut expected = vec!["id", "client_id"];
        expected.extend_from_slice(BOOK_COLUMNS);
        assert_eq!(names, expected);
    }

    #[test]
    fn read_body_parses() {
        let body = read_body(&wire_time(5), &["id", "title"], &[&["1", "Dune"]]);
        let payload = ReadPayload::parse(&body).unwrap();
        assert_eq!(payload.watermark, base_time(5));
        assert_eq!(payload.rows.len(), 1);
    }

    #[test]
    fn ack_body_has_header() {
        assert_eq!(ack_body(&[(1, "a"), (2, "b")]), "id|clientId\n1|a\n2|b");
    }
}
