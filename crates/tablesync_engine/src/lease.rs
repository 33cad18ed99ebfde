//! TTL leases over the per-table locks.
//!
//! A lease is held in two places: an in-process registry, which gives real
//! mutual exclusion between tasks of this process, and the lock timestamp
//! persisted in [`SyncTableState`], which survives crashes and expires on
//! its own after the TTL. Acquisition fails if either is younger than the
//! TTL.
//!
//! Neither provides exclusion against another process sharing the same
//! backend.

use crate::error::{SyncError, SyncResult};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tablesync_core::{LocalStore, LockKind, StoreResult, StoreView, SyncTableState, Transaction};
use tracing::{debug, error, warn};

/// Issues leases for table locks.
#[derive(Debug)]
pub struct LeaseManager {
    ttl: Duration,
    held: Mutex<HashMap<(String, LockKind), Instant>>,
}

impl LeaseManager {
    /// Creates a manager with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the lease TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns true if this process currently holds the lease.
    pub fn is_held(&self, table: &str, kind: LockKind) -> bool {
        self.held
            .lock()
            .get(&(table.to_string(), kind))
            .is_some_and(|at| at.elapsed() < self.ttl)
    }

    /// Acquires the `kind` lease of `table`.
    ///
    /// Fails immediately with [`SyncError::Lock`] if the lease is held;
    /// there is no waiting. The lock timestamp is written in one store
    /// transaction together with the check.
    pub fn acquire<'a, S: LocalStore>(
        &'a self,
        store: &'a S,
        table: &str,
        kind: LockKind,
    ) -> SyncResult<Lease<'a, S>> {
        let key = (table.to_string(), kind);
        let mut held = self.held.lock();

        if let Some(at) = held.get(&key) {
            if at.elapsed() < self.ttl {
                warn!(table, lock = %kind, "lock held in process");
                return Err(SyncError::Lock {
                    table: table.to_string(),
                    kind,
                });
            }
            warn!(table, lock = %kind, "overriding stale in-process lease");
        }

        let ttl = self.ttl;
        let state = store.transaction(|txn| {
            let Some(mut state) = txn.table_state(table) else {
                return Ok(Err(SyncError::TableNotConfigured(table.to_string())));
            };
            let now = Utc::now();
            if state.is_locked(kind, now, ttl) {
                return Ok(Err(SyncError::Lock {
                    table: table.to_string(),
                    kind,
                }));
            }
            state.set_lock(kind, now);
            txn.put_table_state(state.clone());
            Ok(Ok(state))
        })??;

        held.insert(key, Instant::now());
        debug!(table, lock = %kind, "lease acquired");

        Ok(Lease {
            manager: self,
            store,
            table: table.to_string(),
            kind,
            state,
            released: false,
        })
    }

    fn forget(&self, table: &str, kind: LockKind) {
        self.held.lock().remove(&(table.to_string(), kind));
    }
}

/// A held lock.
///
/// Release it with [`Lease::release`] or [`Lease::release_with`]; if it is
/// dropped instead (early return, panic, cancelled future) the lock is freed
/// in `Drop`.
#[must_use = "dropping a lease releases it immediately"]
pub struct Lease<'a, S: LocalStore> {
    manager: &'a LeaseManager,
    store: &'a S,
    table: String,
    kind: LockKind,
    state: SyncTableState,
    released: bool,
}

impl<'a, S: LocalStore> Lease<'a, S> {
    /// Returns the table state as of acquisition.
    pub fn state(&self) -> &SyncTableState {
        &self.state
    }

    /// Returns which lock this lease holds.
    pub fn kind(&self) -> LockKind {
        self.kind
    }

    /// Frees the lock.
    pub fn release(self) -> SyncResult<()> {
        self.release_with(|_, _| Ok(()))
    }

    /// Runs `f` and frees the lock in the same store transaction.
    ///
    /// `f` may stage row writes through the transaction and edit the table
    /// state (e.g. the watermark); both commit together with the unlock. If
    /// the transaction fails the lock is still freed in a second one.
    pub fn release_with<R>(
        mut self,
        f: impl FnOnce(&mut Transaction<'_>, &mut SyncTableState) -> StoreResult<R>,
    ) -> SyncResult<R> {
        self.released = true;
        let (table, kind) = (self.table.as_str(), self.kind);

        let result = self.store.transaction(|txn| {
            let mut state = txn
                .table_state(table)
                .unwrap_or_else(|| self.state.clone());
            let value = f(txn, &mut state)?;
            state.unlock(kind);
            txn.put_table_state(state);
            Ok(value)
        });

        if result.is_err() {
            self.unlock_only();
        }
        self.manager.forget(table, kind);
        debug!(table, lock = %kind, "lease released");

        result.map_err(SyncError::from)
    }

    fn unlock_only(&self) {
        let (table, kind) = (self.table.as_str(), self.kind);
        let result = self.store.transaction(|txn| {
            if let Some(mut state) = txn.table_state(table) {
                state.unlock(kind);
                txn.put_table_state(state);
            }
            Ok(())
        });
        if let Err(err) = result {
            error!(table, lock = %kind, %err, "failed to release lock");
        }
    }
}

impl<S: LocalStore> Drop for Lease<'_, S> {
    fn drop(&mut self) {
        if !self.released {
            self.unlock_only();
            self.manager.forget(&self.table, self.kind);
            debug!(table = %self.table, lock = %self.kind, "lease released on drop");
        }
    }
}
