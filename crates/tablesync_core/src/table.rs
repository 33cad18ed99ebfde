//! Typed table handle.

use crate::entity::SyncEntity;
use crate::error::{StoreError, StoreResult};
use crate::store::{LocalStore, StoreView};
use crate::types::{LocalId, Row, ServerId, SyncMeta, SyncStatus};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// A typed record: entity data plus its sync metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<T> {
    /// Sync metadata.
    pub meta: SyncMeta,
    /// Entity data.
    pub entity: T,
}

impl<T: SyncEntity> Record<T> {
    fn from_row(row: Row) -> Self {
        Self {
            entity: T::from_values(&row.values),
            meta: row.meta,
        }
    }
}

/// A typed view of one synchronized table.
///
/// `Table<S, T>` is what application code uses to mutate synchronized data.
/// Every mutation keeps the sync metadata consistent: inserts are marked
/// `created`, updates of confirmed records `updated`, and deletes `deleted`
/// until the next delete sync.
///
/// # Example
///
/// ```rust,ignore
/// let books: Table<InMemoryStore, Book> = Table::new(store.clone());
///
/// let id = books.insert(&Book { title: "Dune".into(), ..Default::default() })?;
/// for record in books.all().iter().filter(|r| r.entity.page_count > 300) {
///     println!("{}", record.entity.title);
/// }
/// books.delete(&id)?;
/// ```
pub struct Table<S: LocalStore, T: SyncEntity> {
    store: Arc<S>,
    _marker: PhantomData<fn() -> T>,
}

impl<S: LocalStore, T: SyncEntity> Clone for Table<S, T> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.store))
    }
}

impl<S: LocalStore, T: SyncEntity> Table<S, T> {
    /// Creates a handle over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Returns the table name.
    pub fn name(&self) -> &'static str {
        T::TABLE.name
    }

    /// Inserts a new record, returning its local id.
    pub fn insert(&self, entity: &T) -> StoreResult<LocalId> {
        let row = Row::new(SyncMeta::created(), entity.to_values());
        let local_id = row.local_id().clone();
        self.store
            .transaction(|txn| txn.put_row(T::TABLE.name, row))?;
        debug!(table = T::TABLE.name, %local_id, "inserted record");
        Ok(local_id)
    }

    /// Replaces the data of an existing record.
    pub fn update(&self, local_id: &LocalId, entity: &T) -> StoreResult<()> {
        self.store.transaction(|txn| {
            let mut row = txn
                .row(T::TABLE.name, local_id)
                .ok_or_else(|| self.not_found(local_id))?;
            if row.meta.status == SyncStatus::Deleted {
                return Err(StoreError::invalid_operation(format!(
                    "record {local_id} is deleted"
                )));
            }
            row.values = entity.to_values();
            if row.meta.status == SyncStatus::Current {
                row.meta.status = SyncStatus::Updated;
            }
            txn.put_row(T::TABLE.name, row)
        })
    }

    /// Deletes a record.
    ///
    /// The record is marked `deleted` and removed by the next delete sync,
    /// even if the server has never seen it: a push carrying it may already
    /// be in flight.
    pub fn delete(&self, local_id: &LocalId) -> StoreResult<()> {
        self.store.transaction(|txn| {
            let mut row = txn
                .row(T::TABLE.name, local_id)
                .ok_or_else(|| self.not_found(local_id))?;
            row.meta.status = SyncStatus::Deleted;
            txn.put_row(T::TABLE.name, row)
        })
    }

    /// Sets the sync status of a record, e.g. to queue file transfers.
    pub fn set_status(&self, local_id: &LocalId, status: SyncStatus) -> StoreResult<()> {
        self.store.transaction(|txn| {
            let mut row = txn
                .row(T::TABLE.name, local_id)
                .ok_or_else(|| self.not_found(local_id))?;
            row.meta.status = status;
            txn.put_row(T::TABLE.name, row)
        })
    }

    /// Gets a record by local id, including deleted ones.
    pub fn get(&self, local_id: &LocalId) -> Option<Record<T>> {
        self.store
            .read(|view| view.row(T::TABLE.name, local_id))
            .map(Record::from_row)
    }

    /// Gets a record by server id, including deleted ones.
    pub fn get_by_server_id(&self, server_id: ServerId) -> Option<Record<T>> {
        self.store
            .read(|view| view.row_by_server_id(T::TABLE.name, server_id))
            .map(Record::from_row)
    }

    /// Returns all live records (neither soft-deleted nor locally deleted).
    pub fn all(&self) -> Vec<Record<T>> {
        self.store
            .read(|view| view.rows(T::TABLE.name))
            .into_iter()
            .filter(Row::is_live)
            .map(Record::from_row)
            .collect()
    }

    /// Returns the number of live records.
    pub fn count(&self) -> usize {
        self.store.read(|view| {
            view.rows(T::TABLE.name)
                .iter()
                .filter(|r| r.is_live())
                .count()
        })
    }

    fn not_found(&self, local_id: &LocalId) -> StoreError {
        StoreError::RecordNotFound {
            table: T::TABLE.name.to_string(),
            local_id: local_id.clone(),
        }
    }
}
