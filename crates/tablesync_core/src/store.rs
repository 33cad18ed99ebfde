//! The local store contract.
//!
//! A [`LocalStore`] owns every persisted table row and every
//! [`SyncTableState`]. All mutations go through [`LocalStore::transaction`]:
//! the closure sees a consistent view with its own pending writes overlaid,
//! and the writes become visible atomically when it returns `Ok`. An `Err`
//! discards them.

use crate::error::{StoreError, StoreResult};
use crate::table_state::SyncTableState;
use crate::types::{LocalId, Row, ServerId};
use std::collections::{HashMap, HashSet};

/// Read access to store contents.
pub trait StoreView {
    /// Returns the state of a table.
    fn table_state(&self, table: &str) -> Option<SyncTableState>;

    /// Returns every row of a table in insertion order.
    fn rows(&self, table: &str) -> Vec<Row>;

    /// Returns a row by local id.
    fn row(&self, table: &str, local_id: &LocalId) -> Option<Row> {
        self.rows(table)
            .into_iter()
            .find(|r| r.meta.local_id == *local_id)
    }

    /// Returns a row by server id.
    fn row_by_server_id(&self, table: &str, server_id: ServerId) -> Option<Row> {
        self.rows(table)
            .into_iter()
            .find(|r| r.meta.server_id == Some(server_id))
    }
}

/// A transactional local store.
pub trait LocalStore: Send + Sync {
    /// Runs `f` against a consistent snapshot.
    fn read<R>(&self, f: impl FnOnce(&dyn StoreView) -> R) -> R;

    /// Runs `f` inside one atomic write transaction.
    ///
    /// Transactions are serialized: while `f` runs no other transaction can
    /// commit, so a check-and-set inside `f` is race-free.
    fn transaction<R>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> StoreResult<R>,
    ) -> StoreResult<R>;
}

/// A pending row write in a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    /// Insert or replace a row.
    Put(Row),
    /// Remove a row.
    Delete,
}

/// Writes collected by a finished transaction, in the order they were made.
#[derive(Debug, Default)]
pub struct TransactionWrites {
    /// Table states to store.
    pub states: Vec<SyncTableState>,
    /// Row writes: `(table, local id, write)`.
    pub rows: Vec<(String, LocalId, PendingWrite)>,
}

/// An active write transaction.
///
/// Reads through the transaction see its own pending writes.
pub struct Transaction<'a> {
    base: &'a dyn StoreView,
    states: HashMap<String, SyncTableState>,
    state_order: Vec<String>,
    writes: HashMap<(String, LocalId), PendingWrite>,
    write_order: Vec<(String, LocalId)>,
}

impl<'a> Transaction<'a> {
    /// Begins a transaction over `base`.
    pub fn new(base: &'a dyn StoreView) -> Self {
        Self {
            base,
            states: HashMap::new(),
            state_order: Vec::new(),
            writes: HashMap::new(),
            write_order: Vec::new(),
        }
    }

    /// Records a table state write.
    pub fn put_table_state(&mut self, state: SyncTableState) {
        if !self.states.contains_key(&state.table_name) {
            self.state_order.push(state.table_name.clone());
        }
        self.states.insert(state.table_name.clone(), state);
    }

    /// Records a row insert or replacement.
    ///
    /// Fails if another row of the table already holds the row's server id.
    pub fn put_row(&mut self, table: &str, row: Row) -> StoreResult<()> {
        if let Some(server_id) = row.meta.server_id.filter(|id| *id != 0) {
            if let Some(other) = self.row_by_server_id(table, server_id) {
                if other.meta.local_id != row.meta.local_id {
                    return Err(StoreError::DuplicateServerId {
                        table: table.to_string(),
                        server_id,
                    });
                }
            }
        }
        let local_id = row.meta.local_id.clone();
        self.record(table, local_id, PendingWrite::Put(row));
        Ok(())
    }

    /// Records a row removal.
    pub fn delete_row(&mut self, table: &str, local_id: &LocalId) -> StoreResult<()> {
        if self.row(table, local_id).is_none() {
            return Err(StoreError::RecordNotFound {
                table: table.to_string(),
                local_id: local_id.clone(),
            });
        }
        self.record(table, local_id.clone(), PendingWrite::Delete);
        Ok(())
    }

    /// Returns the number of pending writes.
    pub fn write_count(&self) -> usize {
        self.writes.len() + self.states.len()
    }

    /// Finishes the transaction, returning its writes in order.
    pub fn into_writes(self) -> TransactionWrites {
        let Self {
            mut states,
            state_order,
            mut writes,
            write_order,
            ..
        } = self;

        TransactionWrites {
            states: state_order
                .into_iter()
                .filter_map(|name| states.remove(&name))
                .collect(),
            rows: write_order
                .into_iter()
                .filter_map(|key| {
                    let write = writes.remove(&key)?;
                    Some((key.0, key.1, write))
                })
                .collect(),
        }
    }

    fn record(&mut self, table: &str, local_id: LocalId, write: PendingWrite) {
        let key = (table.to_string(), local_id);
        if !self.writes.contains_key(&key) {
            self.write_order.push(key.clone());
        }
        self.writes.insert(key, write);
    }

    fn pending(&self, table: &str, local_id: &LocalId) -> Option<&PendingWrite> {
        self.writes.get(&(table.to_string(), local_id.clone()))
    }
}

impl StoreView for Transaction<'_> {
    fn table_state(&self, table: &str) -> Option<SyncTableState> {
        self.states
            .get(table)
            .cloned()
            .or_else(|| self.base.table_state(table))
    }

    fn rows(&self, table: &str) -> Vec<Row> {
        let base = self.base.rows(table);
        let existing: HashSet<LocalId> = base.iter().map(|r| r.meta.local_id.clone()).collect();

        let mut rows: Vec<Row> = base
            .into_iter()
            .filter_map(|row| match self.pending(table, &row.meta.local_id) {
                Some(PendingWrite::Put(updated)) => Some(updated.clone()),
                Some(PendingWrite::Delete) => None,
                None => Some(row),
            })
            .collect();

        for (t, local_id) in &self.write_order {
            if t != table || existing.contains(local_id) {
                continue;
            }
            if let Some(PendingWrite::Put(row)) = self.pending(table, local_id) {
                rows.push(row.clone());
            }
        }

        rows
    }

    fn row(&self, table: &str, local_id: &LocalId) -> Option<Row> {
        match self.pending(table, local_id) {
            Some(PendingWrite::Put(row)) => Some(row.clone()),
            Some(PendingWrite::Delete) => None,
            None => self.base.row(table, local_id),
        }
    }

    fn row_by_server_id(&self, table: &str, server_id: ServerId) -> Option<Row> {
        for (t, local_id) in &self.write_order {
            if t != table {
                continue;
            }
            if let Some(PendingWrite::Put(row)) = self.pending(table, local_id) {
                if row.meta.server_id == Some(server_id) {
                    return Some(row.clone());
                }
            }
        }
        // A base row shadowed by a pending write was handled above.
        self.base
            .row_by_server_id(table, server_id)
            .filter(|row| self.pending(table, &row.meta.local_id).is_none())
    }
}
