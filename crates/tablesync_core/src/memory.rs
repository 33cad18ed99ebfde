//! In-memory local store.

use crate::error::StoreResult;
use crate::store::{LocalStore, PendingWrite, StoreView, Transaction, TransactionWrites};
use crate::table_state::SyncTableState;
use crate::types::{LocalId, Row};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// An in-memory [`LocalStore`].
///
/// Suitable for:
/// - Unit and integration tests
/// - Ephemeral caches that don't need persistence
///
/// # Thread Safety
///
/// A single mutex guards all contents. Transactions hold it for their
/// whole duration, so they are fully serialized.
///
/// # Example
///
/// ```rust
/// use tablesync_core::{InMemoryStore, LocalStore, StoreView, SyncTableState};
///
/// let store = InMemoryStore::new();
/// store
///     .transaction(|txn| {
///         txn.put_table_state(SyncTableState::new("Book", 1));
///         Ok(())
///     })
///     .unwrap();
/// assert!(store.read(|view| view.table_state("Book")).is_some());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<StoreData>,
}

#[derive(Debug, Default)]
struct StoreData {
    states: BTreeMap<String, SyncTableState>,
    tables: HashMap<String, Vec<Row>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows in a table, including deleted ones.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.inner.lock().tables.get(table).map_or(0, Vec::len)
    }

    /// Returns the names of all tables with a stored state.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.inner.lock().states.keys().cloned().collect()
    }
}

impl StoreData {
    fn apply(&mut self, writes: TransactionWrites) {
        for state in writes.states {
            self.states.insert(state.table_name.clone(), state);
        }

        for (table, local_id, write) in writes.rows {
            let rows = self.tables.entry(table).or_default();
            let position = rows.iter().position(|r| r.meta.local_id == local_id);
            match (write, position) {
                (PendingWrite::Put(row), Some(i)) => rows[i] = row,
                (PendingWrite::Put(row), None) => rows.push(row),
                (PendingWrite::Delete, Some(i)) => {
                    rows.remove(i);
                }
                (PendingWrite::Delete, None) => {}
            }
        }
    }
}

impl StoreView for StoreData {
    fn table_state(&self, table: &str) -> Option<SyncTableState> {
        self.states.get(table).cloned()
    }

    fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.get(table).cloned().unwrap_or_default()
    }

    fn row(&self, table: &str, local_id: &LocalId) -> Option<Row> {
        self.tables
            .get(table)?
            .iter()
            .find(|r| r.meta.local_id == *local_id)
            .cloned()
    }

    fn row_by_server_id(&self, table: &str, server_id: i64) -> Option<Row> {
        self.tables
            .get(table)?
            .iter()
            .find(|r| r.meta.server_id == Some(server_id))
            .cloned()
    }
}

impl LocalStore for InMemoryStore {
    fn read<R>(&self, f: impl FnOnce(&dyn StoreView) -> R) -> R {
        let data = self.inner.lock();
        f(&*data)
    }

    fn transaction<R>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let mut data = self.inner.lock();
        let (result, writes) = {
            let mut txn = Transaction::new(&*data);
            let result = f(&mut txn)?;
            (result, txn.into_writes())
        };
        trace!(
            states = writes.states.len(),
            rows = writes.rows.len(),
            "committing transaction"
        );
        data.apply(writes);
        Ok(result)
    }
}
