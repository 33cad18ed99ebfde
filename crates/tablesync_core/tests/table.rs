//! Integration tests for the typed table handle.

use std::sync::Arc;
use tablesync_codec::{FieldType, Value};
use tablesync_core::{
    Field, InMemoryStore, LocalId, LocalStore, StoreError, StoreView, SyncEntity, SyncStatus,
    Table, TableInfo,
};

#[derive(Debug, Clone, Default, PartialEq)]
struct Note {
    body: String,
    pinned: bool,
}

impl SyncEntity for Note {
    const TABLE: TableInfo = TableInfo::new("Note", 1);
    const FIELDS: &'static [Field<Self>] = &[
        Field::new(
            "body",
            FieldType::String,
            |n| Value::from(n.body.as_str()),
            |n, v| n.body = v.as_text().unwrap_or_default().to_string(),
        ),
        Field::new(
            "pinned",
            FieldType::Bool,
            |n| Value::Bool(n.pinned),
            |n, v| n.pinned = v.as_bool().unwrap_or_default(),
        ),
    ];
}

fn note(body: &str) -> Note {
    Note {
        body: body.into(),
        pinned: false,
    }
}

fn setup() -> (Arc<InMemoryStore>, Table<InMemoryStore, Note>) {
    let store = Arc::new(InMemoryStore::new());
    let table = Table::new(Arc::clone(&store));
    (store, table)
}

fn mark_confirmed(store: &InMemoryStore, id: &LocalId, server_id: i64) {
    store
        .transaction(|txn| {
            let mut row = txn.row("Note", id).unwrap();
            row.meta.server_id = Some(server_id);
            row.meta.status = SyncStatus::Current;
            txn.put_row("Note", row)
        })
        .unwrap();
}

#[test]
fn insert_marks_created() {
    let (_, notes) = setup();
    let id = notes.insert(&note("first")).unwrap();

    let record = notes.get(&id).unwrap();
    assert_eq!(record.entity, note("first"));
    assert_eq!(record.meta.status, SyncStatus::Created);
    assert_eq!(record.meta.server_id, None);
    assert_eq!(notes.count(), 1);
}

#[test]
fn update_of_confirmed_record_marks_updated() {
    let (store, notes) = setup();
    let id = notes.insert(&note("draft")).unwrap();

    notes.update(&id, &note("still a draft")).unwrap();
    assert_eq!(notes.get(&id).unwrap().meta.status, SyncStatus::Created);

    mark_confirmed(&store, &id, 10);
    notes.update(&id, &note("final")).unwrap();
    let record = notes.get(&id).unwrap();
    assert_eq!(record.meta.status, SyncStatus::Updated);
    assert_eq!(record.entity.body, "final");
}

#[test]
fn delete_of_unpushed_record_leaves_tombstone() {
    let (store, notes) = setup();
    let id = notes.insert(&note("temp")).unwrap();
    notes.delete(&id).unwrap();

    let record = notes.get(&id).unwrap();
    assert_eq!(record.meta.status, SyncStatus::Deleted);
    assert_eq!(record.meta.server_id, None);
    assert_eq!(store.row_count("Note"), 1);
    assert!(notes.all().is_empty());
}

#[test]
fn delete_of_pushed_record_is_deferred() {
    let (store, notes) = setup();
    let id = notes.insert(&note("kept")).unwrap();
    mark_confirmed(&store, &id, 3);

    notes.delete(&id).unwrap();
    assert_eq!(notes.get(&id).unwrap().meta.status, SyncStatus::Deleted);
    assert_eq!(store.row_count("Note"), 1);
    assert!(notes.all().is_empty());

    let err = notes.update(&id, &note("too late")).unwrap_err();
    assert!(matches!(err, StoreError::InvalidOperation { .. }));
}

#[test]
fn all_hides_soft_deleted_rows() {
    let (store, notes) = setup();
    let a = notes.insert(&note("a")).unwrap();
    notes.insert(&note("b")).unwrap();

    store
        .transaction(|txn| {
            let mut row = txn.row("Note", &a).unwrap();
            row.meta.soft_deleted = true;
            txn.put_row("Note", row)
        })
        .unwrap();

    let bodies: Vec<String> = notes.all().into_iter().map(|r| r.entity.body).collect();
    assert_eq!(bodies, vec!["b"]);
    assert!(notes.get(&a).unwrap().meta.soft_deleted);
}

#[test]
fn lookup_by_server_id() {
    let (store, notes) = setup();
    let id = notes.insert(&note("x")).unwrap();
    mark_confirmed(&store, &id, 99);

    let record = notes.get_by_server_id(99).unwrap();
    assert_eq!(record.meta.local_id, id);
    assert!(notes.get_by_server_id(100).is_none());
}

#[test]
fn missing_record_errors() {
    let (_, notes) = setup();
    let missing = LocalId::new();
    assert!(matches!(
        notes.update(&missing, &note("x")),
        Err(StoreError::RecordNotFound { .. })
    ));
    assert!(notes.delete(&missing).is_err());
    assert!(notes.set_status(&missing, SyncStatus::PendingUpload).is_err());
}

#[test]
fn set_status_queues_transfers() {
    let (_, notes) = setup();
    let id = notes.insert(&note("with file")).unwrap();
    notes.set_status(&id, SyncStatus::PendingUpload).unwrap();
    assert_eq!(notes.get(&id).unwrap().meta.status, SyncStatus::PendingUpload);
    assert_eq!(notes.name(), "Note");
}
