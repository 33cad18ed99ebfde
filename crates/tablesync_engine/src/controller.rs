//! The sync controller.

use crate::applier::{apply_acks, apply_deletions, apply_read, purge_unsent};
use crate::auth::AuthProvider;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::files::{BlobTransfer, FileSyncReport, FileTransfer};
use crate::hooks::{NoopHooks, SyncHooks};
use crate::lease::LeaseManager;
use crate::transport::{
    AccessToken, HttpClient, HttpResponse, PushRequest, ReadRequest, SyncRequest, TableTarget,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tablesync_codec::{AckList, ReadPayload, RecordCodec, Value, WireRecord};
use tablesync_core::{
    LocalId, LocalStore, LockKind, Row, StoreView, SyncStatus, SyncTableState, TableSchema,
};
use tracing::{debug, info, warn};

/// Per-table outcome of a multi-table [`SyncController::sync`].
#[derive(Debug)]
pub struct TableReport {
    /// Table name.
    pub table: String,
    /// Number of records confirmed by the write step.
    pub write: SyncResult<usize>,
    /// Number of records purged by the delete step.
    pub delete: SyncResult<usize>,
    /// Whether the read step changed local data.
    pub read: SyncResult<bool>,
}

impl TableReport {
    /// Returns true if every step succeeded.
    pub fn is_success(&self) -> bool {
        self.write.is_ok() && self.delete.is_ok() && self.read.is_ok()
    }
}

/// Outcome of a multi-table [`SyncController::sync`].
#[derive(Debug, Default)]
pub struct SyncReport {
    /// One entry per requested table, in request order.
    pub tables: Vec<TableReport>,
    /// Whether an access token was available.
    pub authenticated: bool,
}

impl SyncReport {
    /// Returns true if every step of every table succeeded.
    pub fn is_success(&self) -> bool {
        self.tables.iter().all(TableReport::is_success)
    }

    /// Returns the report for a table.
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Records created or updated by pulls.
    pub records_pulled: u64,
    /// Records confirmed by pushes.
    pub records_pushed: u64,
    /// Records purged after a delete push.
    pub records_deleted: u64,
    /// Read retries performed by `sync_table`.
    pub retries: u64,
    /// Last successful operation.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Orchestrates synchronization of configured tables.
///
/// The controller is an ordinary value: construct it with its collaborators
/// and share it (e.g. in an `Arc`) with whatever needs to trigger syncs.
pub struct SyncController<S: LocalStore> {
    store: Arc<S>,
    http: Arc<dyn HttpClient>,
    auth: Arc<dyn AuthProvider>,
    hooks: Arc<dyn SyncHooks>,
    blobs: Option<Arc<dyn BlobTransfer>>,
    config: SyncConfig,
    leases: LeaseManager,
    schemas: RwLock<HashMap<String, Arc<TableSchema>>>,
    stats: RwLock<SyncStats>,
}

impl<S: LocalStore> SyncController<S> {
    /// Creates a controller.
    pub fn new(
        store: Arc<S>,
        http: Arc<dyn HttpClient>,
        auth: Arc<dyn AuthProvider>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            http,
            auth,
            hooks: Arc::new(NoopHooks),
            blobs: None,
            leases: LeaseManager::new(config.lock_ttl),
            config,
            schemas: RwLock::new(HashMap::new()),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Sets the application hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn SyncHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sets the file transfer collaborator.
    pub fn with_blob_transfer(mut self, blobs: Arc<dyn BlobTransfer>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the lease manager.
    pub fn leases(&self) -> &LeaseManager {
        &self.leases
    }

    /// Returns the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the stored state of a table.
    pub fn table_state(&self, table: &str) -> Option<SyncTableState> {
        self.store.read(|view| view.table_state(table))
    }

    /// Registers tables and creates their sync state.
    ///
    /// Idempotent: an existing state is kept, except that a schema version
    /// change resets its watermark so the next pull fetches everything.
    pub fn configure(&self, schemas: impl IntoIterator<Item = TableSchema>) -> SyncResult<()> {
        let schemas: Vec<TableSchema> = schemas.into_iter().collect();

        self.store.transaction(|txn| {
            for schema in &schemas {
                match txn.table_state(&schema.name) {
                    None => {
                        debug!(table = %schema.name, version = schema.version, "creating table state");
                        txn.put_table_state(SyncTableState::new(&schema.name, schema.version));
                    }
                    Some(mut state) if state.schema_version != schema.version => {
                        info!(
                            table = %schema.name,
                            from = state.schema_version,
                            to = schema.version,
                            "schema version changed, forcing full resync"
                        );
                        state.schema_version = schema.version;
                        state.reset_watermark();
                        txn.put_table_state(state);
                    }
                    Some(_) => {}
                }
            }
            Ok(())
        })?;

        let mut registry = self.schemas.write();
        for schema in schemas {
            registry.insert(schema.name.clone(), Arc::new(schema));
        }
        Ok(())
    }

    /// Returns the schema of a configured table.
    pub fn schema(&self, table: &str) -> SyncResult<Arc<TableSchema>> {
        self.schemas
            .read()
            .get(table)
            .cloned()
            .ok_or_else(|| SyncError::TableNotConfigured(table.to_string()))
    }

    /// Pulls changes since the stored watermark and applies them.
    ///
    /// Returns whether local data changed. Fails fast: there is no retry
    /// here (see [`SyncController::sync_table`]).
    pub async fn read_sync(&self, table: &str, token: Option<&AccessToken>) -> SyncResult<bool> {
        let result = self
            .read_once(table, token, self.config.request_timeout)
            .await;
        self.record(&result);
        result
    }

    /// Pulls a table unless it is fresh, retrying on failure.
    ///
    /// Skips the network if the watermark is younger than `freshness` and
    /// the table holds at least one live row. Otherwise reads up to
    /// `retry.max_attempts` times with a fixed pause between attempts, on
    /// any failure. `timeout` is the per-request transport timeout.
    pub async fn sync_table(
        &self,
        table: &str,
        freshness: Option<Duration>,
        timeout: Option<Duration>,
    ) -> SyncResult<bool> {
        let schema = self.schema(table)?;
        let freshness = freshness.unwrap_or(self.config.default_freshness);
        let timeout = timeout.unwrap_or(self.config.request_timeout);

        let (fresh, has_rows) = self.store.read(|view| {
            let fresh = view
                .table_state(table)
                .is_some_and(|s| s.is_fresh(Utc::now(), freshness));
            let has_rows = view.rows(table).iter().any(Row::is_live);
            (fresh, has_rows)
        });
        if fresh && has_rows {
            debug!(table, "table is fresh, skipping pull");
            return Ok(false);
        }

        let token = match self.auth.access_token().await {
            Ok(token) => Some(token),
            Err(err) => {
                debug!(table, %err, requires_auth = schema.requires_auth, "reading without a token");
                None
            }
        };

        let retry = &self.config.retry;
        let mut attempt = 1;
        loop {
            let result = self.read_once(table, token.as_ref(), timeout).await;
            match result {
                Err(err) if attempt < retry.max_attempts => {
                    debug!(table, attempt, %err, "read failed, retrying");
                    self.stats.write().retries += 1;
                    attempt += 1;
                    tokio::time::sleep(retry.interval).await;
                }
                result => {
                    self.record(&result);
                    return result;
                }
            }
        }
    }

    /// Pushes created and updated records.
    ///
    /// Sends at most `write_batch_limit` records; the rest wait for a later
    /// call. Returns the number of records the server confirmed. Records
    /// the server did not acknowledge stay dirty, and so do records edited
    /// while the push was in flight.
    pub async fn write_sync(&self, table: &str, token: Option<&AccessToken>) -> SyncResult<usize> {
        let result = self.write_once(table, token).await;
        self.record(&result);
        result
    }

    /// Pushes local deletions and purges the ones the server accepted.
    ///
    /// Records the server never saw are purged without a request, unless a
    /// write lease is held for the table. Returns the number of purged
    /// records; nothing to delete is `Ok(0)`.
    pub async fn delete_sync(&self, table: &str, token: Option<&AccessToken>) -> SyncResult<usize> {
        let result = self.delete_once(table, token).await;
        self.record(&result);
        result
    }

    /// Synchronizes several tables.
    ///
    /// Obtains one token for the whole run; without one, pushes are skipped
    /// and reads run unauthenticated. For each table the write and delete
    /// steps run concurrently, then the read step runs whatever they
    /// returned.
    pub async fn sync(&self, tables: &[&str]) -> SyncReport {
        let token = match self.auth.access_token().await {
            Ok(token) => Some(token),
            Err(err) => {
                warn!(%err, "no access token, syncing read-only");
                None
            }
        };

        let mut report = SyncReport {
            tables: Vec::with_capacity(tables.len()),
            authenticated: token.is_some(),
        };

        for &table in tables {
            let (write, delete) = match &token {
                Some(token) => tokio::join!(
                    self.write_sync(table, Some(token)),
                    self.delete_sync(table, Some(token))
                ),
                None => (
                    Err(SyncError::authentication("write requires a session")),
                    Err(SyncError::authentication("delete requires a session")),
                ),
            };
            let read = self.read_sync(table, token.as_ref()).await;

            debug!(
                table,
                write = write.is_ok(),
                delete = delete.is_ok(),
                read = read.is_ok(),
                "table synced"
            );
            report.tables.push(TableReport {
                table: table.to_string(),
                write,
                delete,
                read,
            });
        }

        report
    }

    /// Removes rows the server reported deleted.
    pub fn purge_soft_deleted(&self, table: &str) -> SyncResult<usize> {
        self.schema(table)?;
        let purged = self.store.transaction(|txn| {
            let doomed: Vec<LocalId> = txn
                .rows(table)
                .into_iter()
                .filter(|r| r.meta.soft_deleted)
                .map(|r| r.meta.local_id)
                .collect();
            for local_id in &doomed {
                txn.delete_row(table, local_id)?;
            }
            Ok(doomed.len())
        })?;
        debug!(table, purged, "purged soft-deleted rows");
        Ok(purged)
    }

    /// Transfers file attachments of rows waiting for upload or download.
    ///
    /// A row becomes `current` once all its attributes transferred; a
    /// failure leaves it pending and is listed in the report.
    pub async fn sync_files(&self, table: &str) -> SyncResult<FileSyncReport> {
        let schema = self.schema(table)?;
        let mut report = FileSyncReport::default();

        let Some(blobs) = self.blobs.as_ref() else {
            debug!(table, "no blob transfer configured");
            return Ok(report);
        };
        if schema.files.is_empty() {
            return Ok(report);
        }

        let codec = schema.codec();
        let pending: Vec<Row> = self.store.read(|view| {
            view.rows(table)
                .into_iter()
                .filter(|r| {
                    matches!(
                        r.meta.status,
                        SyncStatus::PendingUpload | SyncStatus::PendingDownload
                    )
                })
                .collect()
        });

        for row in pending {
            let metadata = codec.export(row.meta.server_id, row.meta.local_id.as_str(), &row.values);
            let mut failure = None;

            for attribute in &schema.files {
                let transfer = FileTransfer::for_row(table, attribute, &row, metadata.clone());
                let result = match row.meta.status {
                    SyncStatus::PendingUpload => blobs.upload(&transfer).await,
                    _ => blobs.download(&transfer).await,
                };
                if let Err(err) = result {
                    warn!(table, key = attribute.key, local_id = %row.meta.local_id, %err, "file transfer failed");
                    failure = Some(err);
                    break;
                }
            }

            match failure {
                Some(err) => report.failed.push((row.meta.local_id.clone(), err)),
                None => {
                    let expected = row.meta.status;
                    let local_id = row.meta.local_id.clone();
                    self.store.transaction(|txn| {
                        if let Some(mut current) = txn.row(table, &local_id) {
                            if current.meta.status == expected {
                                current.meta.status = SyncStatus::Current;
                                txn.put_row(table, current)?;
                            }
                        }
                        Ok(())
                    })?;
                    report.completed.push(local_id);
                }
            }
        }

        Ok(report)
    }

    async fn read_once(
        &self,
        table: &str,
        token: Option<&AccessToken>,
        timeout: Duration,
    ) -> SyncResult<bool> {
        let schema = self.schema(table)?;
        if !schema.permissions.read {
            return Err(SyncError::permission(table, "read is disabled"));
        }
        if schema.requires_auth && token.is_none() {
            return Err(SyncError::permission(table, "read requires an access token"));
        }

        let lease = self.leases.acquire(&*self.store, table, LockKind::Read)?;
        let request = SyncRequest::Read(ReadRequest {
            target: target(&schema),
            access_token: token.cloned(),
            since: lease.state().since(),
            timeout,
        });

        let response = match self.send(table, request).await {
            Ok(response) => response,
            Err(err) => {
                lease.release()?;
                return Err(err);
            }
        };

        let payload = match ReadPayload::parse(&response.body) {
            Ok(payload) => payload,
            Err(source) => {
                warn!(table, %source, "malformed read response, resetting watermark");
                lease.release_with(|_, state| {
                    state.last_server_sync = None;
                    Ok(())
                })?;
                return Err(SyncError::MalformedResponse {
                    table: table.to_string(),
                    source,
                });
            }
        };

        let codec = schema.codec();
        let applied = lease.release_with(|txn, state| {
            let applied = apply_read(txn, table, &codec, &payload)?;
            if !state.advance_watermark(payload.watermark) {
                warn!(table, watermark = %payload.watermark, since = %state.since(), "server watermark went backwards, keeping ours");
            }
            Ok(applied)
        })?;

        debug!(
            table,
            rows = payload.rows.len(),
            created = applied.created,
            updated = applied.updated,
            soft_deleted = applied.soft_deleted,
            watermark = %payload.watermark,
            "read applied"
        );
        self.stats.write().records_pulled += (applied.created + applied.updated) as u64;
        Ok(applied.changed())
    }

    async fn write_once(&self, table: &str, token: Option<&AccessToken>) -> SyncResult<usize> {
        let schema = self.schema(table)?;
        if !schema.permissions.write {
            return Err(SyncError::permission(table, "write is disabled"));
        }
        let token = token.ok_or_else(|| SyncError::permission(table, "write requires an access token"))?;

        let lease = self.leases.acquire(&*self.store, table, LockKind::Write)?;
        let batch: Vec<Row> = self.store.read(|view| {
            view.rows(table)
                .into_iter()
                .filter(|r| r.meta.status.is_dirty() && !r.meta.soft_deleted)
                .take(self.config.write_batch_limit)
                .collect()
        });
        if batch.is_empty() {
            lease.release()?;
            return Ok(0);
        }

        let codec = schema.codec();
        let request = SyncRequest::Write(PushRequest {
            target: target(&schema),
            access_token: token.clone(),
            records: export_all(&codec, &batch),
            timeout: self.config.request_timeout,
        });

        let response = match self.send(table, request).await {
            Ok(response) => response,
            Err(err) => {
                lease.release()?;
                return Err(err);
            }
        };

        let sent: HashMap<LocalId, BTreeMap<String, Value>> = batch
            .iter()
            .map(|r| (r.meta.local_id.clone(), r.values.clone()))
            .collect();
        let acks = AckList::parse(&response.body);
        let confirmed = lease.release_with(|txn, _| apply_acks(txn, table, &acks, &sent))?;
        if confirmed < batch.len() {
            debug!(table, sent = batch.len(), confirmed, "partial write, rest deferred");
        }
        self.stats.write().records_pushed += confirmed as u64;
        Ok(confirmed)
    }

    async fn delete_once(&self, table: &str, token: Option<&AccessToken>) -> SyncResult<usize> {
        let schema = self.schema(table)?;
        if !schema.permissions.delete {
            return Err(SyncError::permission(table, "delete is disabled"));
        }
        let token = token.ok_or_else(|| SyncError::permission(table, "delete requires an access token"))?;

        let lease = self.leases.acquire(&*self.store, table, LockKind::Delete)?;
        let (doomed, unsent): (Vec<Row>, Vec<Row>) = self.store.read(|view| {
            view.rows(table)
                .into_iter()
                .filter(|r| r.meta.status == SyncStatus::Deleted)
                .partition(|r| r.meta.is_known_to_server())
        });
        if doomed.is_empty() && unsent.is_empty() {
            lease.release()?;
            return Ok(0);
        }

        if !doomed.is_empty() {
            let codec = schema.codec();
            let request = SyncRequest::Delete(PushRequest {
                target: target(&schema),
                access_token: token.clone(),
                records: export_all(&codec, &doomed),
                timeout: self.config.request_timeout,
            });

            if let Err(err) = self.send(table, request).await {
                lease.release()?;
                return Err(err);
            }
        }

        let sent: Vec<LocalId> = doomed.into_iter().map(|r| r.meta.local_id).collect();
        let unsent: Vec<LocalId> = unsent.into_iter().map(|r| r.meta.local_id).collect();
        let ttl = self.leases.ttl();
        let removed = lease.release_with(|txn, state| {
            let mut removed = apply_deletions(txn, table, &sent)?;
            if unsent.is_empty() {
                return Ok(removed);
            }
            // An in-flight push may still be carrying these records.
            if state.is_locked(LockKind::Write, Utc::now(), ttl) {
                debug!(table, pending = unsent.len(), "write in flight, keeping unsent tombstones");
            } else {
                removed += purge_unsent(txn, table, &unsent)?;
            }
            Ok(removed)
        })?;
        self.stats.write().records_deleted += removed as u64;
        Ok(removed)
    }

    /// Sends a request and maps everything but a 200 to an error.
    async fn send(&self, table: &str, request: SyncRequest) -> SyncResult<HttpResponse> {
        let kind = request.kind();
        let response = self.http.request(request).await?;

        if response.is_forbidden() {
            warn!(table, kind, "forbidden");
            self.hooks.forbidden(table);
            return Err(SyncError::permission(table, "server returned 403"));
        }
        if !response.is_ok() {
            return Err(SyncError::Server {
                table: table.to_string(),
                status: response.status,
            });
        }
        Ok(response)
    }

    fn record<T>(&self, result: &SyncResult<T>) {
        let mut stats = self.stats.write();
        match result {
            Ok(_) => {
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
            }
            Err(err) => stats.last_error = Some(err.to_string()),
        }
    }
}

fn target(schema: &TableSchema) -> TableTarget {
    TableTarget {
        table_version: schema.version,
        table_name: schema.name.clone(),
        view_name: schema.view.clone(),
    }
}

fn export_all(codec: &RecordCodec, rows: &[Row]) -> Vec<WireRecord> {
    rows.iter()
        .map(|r| codec.export(r.meta.server_id, r.meta.local_id.as_str(), &r.values))
        .collect()
}
