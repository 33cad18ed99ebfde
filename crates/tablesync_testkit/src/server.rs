//! A loopback backend for end-to-end tests.
//!
//! [`FakeServer`] keeps its own copy of each table and answers
//! [`SyncRequest`]s the way a tabular backend would: reads return rows
//! modified after the watermark, writes assign server ids and acknowledge,
//! deletes flag rows so later reads report them deleted.
//!
//! Time is logical. Every mutation advances the clock by one second, so
//! second-resolution watermarks never miss a change.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use tablesync_codec::{timestamp, WireRecord, CLIENT_ID_COLUMN, DELETE_COLUMN, ID_COLUMN};
use tablesync_engine::{HttpClient, HttpResponse, SyncRequest, TransportError};

use crate::fixtures::base_time;

/// One server-side row.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRow {
    /// Server id.
    pub id: i64,
    /// Values by wire column.
    pub values: BTreeMap<String, String>,
    /// Whether the row was deleted.
    pub deleted: bool,
    /// Logical modification time.
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ServerTable {
    columns: Vec<String>,
    rows: Vec<ServerRow>,
}

#[derive(Debug, Default)]
struct ServerState {
    tables: HashMap<String, ServerTable>,
    clock: i64,
    next_id: i64,
    forbidden: HashSet<String>,
    offline: usize,
    ignore_writes: HashSet<String>,
    log: Vec<SyncRequest>,
}

impl ServerState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        base_time(self.clock)
    }
}

/// An in-process tabular backend.
#[derive(Debug, Default)]
pub struct FakeServer {
    state: Mutex<ServerState>,
}

impl FakeServer {
    /// Creates a server without tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table with the given wire columns (excluding `id`).
    pub fn with_table(self, name: &str, columns: &[&str]) -> Self {
        self.state.lock().tables.insert(
            name.to_string(),
            ServerTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
        self
    }

    /// Inserts a row as if another client had pushed it. Returns its id.
    pub fn insert_remote(&self, table: &str, values: &[(&str, &str)]) -> i64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        let modified = state.tick();
        let rows = &mut table_mut(&mut state, table).rows;
        rows.push(ServerRow {
            id,
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            deleted: false,
            modified,
        });
        id
    }

    /// Changes one column of a row as if another client had pushed it.
    pub fn update_remote(&self, table: &str, id: i64, column: &str, value: &str) {
        let mut state = self.state.lock();
        let modified = state.tick();
        if let Some(row) = find_mut(table_mut(&mut state, table), id) {
            row.values.insert(column.to_string(), value.to_string());
            row.modified = modified;
        }
    }

    /// Deletes a row as if another client had pushed the deletion.
    pub fn delete_remote(&self, table: &str, id: i64) {
        let mut state = self.state.lock();
        let modified = state.tick();
        if let Some(row) = find_mut(table_mut(&mut state, table), id) {
            row.deleted = true;
            row.modified = modified;
        }
    }

    /// Answers every request for `table` with 403.
    pub fn forbid(&self, table: &str) {
        self.state.lock().forbidden.insert(table.to_string());
    }

    /// Fails the next `n` requests with a connection error.
    pub fn go_offline(&self, n: usize) {
        self.state.lock().offline = n;
    }

    /// Accepts writes for `table` without acknowledging any of them.
    pub fn drop_acks(&self, table: &str) {
        self.state.lock().ignore_writes.insert(table.to_string());
    }

    /// Returns the live rows of a table.
    pub fn rows(&self, table: &str) -> Vec<ServerRow> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.iter().filter(|r| !r.deleted).cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every request received, in order.
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.state.lock().log.clone()
    }

    /// Returns the number of requests of a kind received.
    pub fn request_count(&self, kind: &str) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|r| r.kind() == kind)
            .count()
    }

    fn handle(&self, request: SyncRequest) -> Result<HttpResponse, TransportError> {
        let mut state = self.state.lock();
        state.log.push(request.clone());

        if state.offline > 0 {
            state.offline -= 1;
            return Err(TransportError::Connection("server unreachable".into()));
        }
        let table = request.target().table_name.clone();
        if state.forbidden.contains(&table) {
            return Ok(HttpResponse::status(403));
        }
        if !state.tables.contains_key(&table) {
            return Ok(HttpResponse::status(404));
        }

        match request {
            SyncRequest::Read(read) => {
                let since = if read.since.is_empty() {
                    None
                } else {
                    match timestamp::parse(&read.since) {
                        Ok(since) => Some(since),
                        Err(_) => return Ok(HttpResponse::status(400)),
                    }
                };
                let now = base_time(state.clock);
                Ok(HttpResponse::ok(render_read(
                    table_mut(&mut state, &table),
                    since,
                    now,
                )))
            }
            SyncRequest::Write(push) => {
                let acknowledge = !state.ignore_writes.contains(&table);
                let mut acks = vec![format!("{ID_COLUMN}|clientId")];
                for record in &push.records {
                    let id = upsert(&mut state, &table, record);
                    if acknowledge {
                        acks.push(format!(
                            "{id}|{}",
                            record.correlation_id().unwrap_or_default()
                        ));
                    }
                }
                Ok(HttpResponse::ok(acks.join("\n")))
            }
            SyncRequest::Delete(push) => {
                for record in &push.records {
                    let Some(id) = record.get(ID_COLUMN).and_then(|v| v.parse::<i64>().ok())
                    else {
                        continue;
                    };
                    let modified = state.tick();
                    if let Some(row) = find_mut(table_mut(&mut state, &table), id) {
                        row.deleted = true;
                        row.modified = modified;
                    }
                }
                Ok(HttpResponse::ok(""))
            }
        }
    }
}

#[async_trait]
impl HttpClient for FakeServer {
    async fn request(&self, request: SyncRequest) -> Result<HttpResponse, TransportError> {
        self.handle(request)
    }
}

fn table_mut<'a>(state: &'a mut ServerState, table: &str) -> &'a mut ServerTable {
    state.tables.entry(table.to_string()).or_default()
}

fn find_mut(table: &mut ServerTable, id: i64) -> Option<&mut ServerRow> {
    table.rows.iter_mut().find(|r| r.id == id)
}

fn upsert(state: &mut ServerState, table: &str, record: &WireRecord) -> i64 {
    let existing = record
        .get(ID_COLUMN)
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|id| *id != 0);
    let modified = state.tick();
    let id = match existing {
        Some(id) => id,
        None => {
            state.next_id += 1;
            state.next_id
        }
    };

    let values: BTreeMap<String, String> = record
        .fields
        .iter()
        .filter(|(k, _)| k != ID_COLUMN && k != CLIENT_ID_COLUMN)
        .cloned()
        .collect();

    let server_table = table_mut(state, table);
    match find_mut(server_table, id) {
        Some(row) => {
            row.values = values;
            row.deleted = false;
            row.modified = modified;
        }
        None => server_table.rows.push(ServerRow {
            id,
            values,
            deleted: false,
            modified,
        }),
    }
    id
}

fn render_read(table: &ServerTable, since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let mut header = vec![ID_COLUMN.to_string()];
    header.extend(table.columns.iter().cloned());
    header.push(DELETE_COLUMN.to_string());

    let mut lines = vec![format!("meta|{}", timestamp::format(&now)), header.join("|")];
    for row in &table.rows {
        if since.is_some_and(|since| row.modified <= since) {
            continue;
        }
        // A row deleted before the client ever saw it is still reported;
        // the client ignores deletions of unknown rows.
        let mut line = vec![row.id.to_string()];
        for column in &table.columns {
            line.push(row.values.get(column).cloned().unwrap_or_default());
        }
        line.push(row.deleted.to_string());
        lines.push(line.join("|"));
    }
    lines.join("\n")
}
