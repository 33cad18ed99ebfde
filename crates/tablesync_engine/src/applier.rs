//! Applying server responses to the local store.
//!
//! These functions run inside the transaction that also releases the
//! operation's lease, so the rows, the watermark and the unlock commit
//! together.

use std::collections::{BTreeMap, HashMap};
use tablesync_codec::{AckList, FieldDiagnostic, ReadPayload, RecordCodec, Value};
use tablesync_core::{LocalId, Row, StoreResult, StoreView, SyncMeta, SyncStatus, Transaction};
use tracing::{debug, warn};

/// Counts from applying a read payload.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ReadApply {
    pub created: usize,
    pub updated: usize,
    pub soft_deleted: usize,
    pub restored: usize,
    pub diagnostics: Vec<FieldDiagnostic>,
}

impl ReadApply {
    pub fn changed(&self) -> bool {
        self.created + self.updated + self.soft_deleted + self.restored > 0
    }
}

/// Applies a pulled payload: upserts by server id and soft-deletes rows the
/// server reported deleted. Only rows whose values actually change are
/// written.
pub(crate) fn apply_read(
    txn: &mut Transaction<'_>,
    table: &str,
    codec: &RecordCodec,
    payload: &ReadPayload,
) -> StoreResult<ReadApply> {
    let mut stats = ReadApply::default();
    let mut by_server_id: HashMap<i64, Row> = txn
        .rows(table)
        .into_iter()
        .filter_map(|row| row.meta.server_id.map(|id| (id, row)))
        .collect();

    for incoming in &payload.rows {
        match by_server_id.get_mut(&incoming.server_id) {
            Some(existing) if incoming.deleted => {
                if !existing.meta.soft_deleted {
                    existing.meta.soft_deleted = true;
                    txn.put_row(table, existing.clone())?;
                    stats.soft_deleted += 1;
                }
            }
            Some(existing) => {
                let outcome = codec.import(&payload.header, &incoming.values, &mut existing.values);
                let restored = existing.meta.soft_deleted;
                existing.meta.soft_deleted = false;
                if outcome.changed || restored {
                    txn.put_row(table, existing.clone())?;
                }
                if outcome.changed {
                    stats.updated += 1;
                }
                if restored {
                    stats.restored += 1;
                }
                stats.diagnostics.extend(outcome.diagnostics);
            }
            None if incoming.deleted => {
                debug!(table, server_id = incoming.server_id, "ignoring deletion of unknown record");
            }
            None => {
                let mut row = Row::new(SyncMeta::pulled(incoming.server_id), BTreeMap::new());
                let outcome = codec.import(&payload.header, &incoming.values, &mut row.values);
                stats.diagnostics.extend(outcome.diagnostics);
                txn.put_row(table, row.clone())?;
                by_server_id.insert(incoming.server_id, row);
                stats.created += 1;
            }
        }
    }

    for diagnostic in &stats.diagnostics {
        warn!(table, %diagnostic, "field not imported");
    }

    Ok(stats)
}

/// Applies write acknowledgements, returning the number of confirmed rows.
///
/// Each ack is matched by correlation id first, then by server id. A
/// confirmed row gets the server id. It becomes `current` only if it is
/// still dirty and its values equal the ones in `sent`: a row edited while
/// the push was in flight stays `updated` and a row deleted meanwhile stays
/// `deleted`.
pub(crate) fn apply_acks(
    txn: &mut Transaction<'_>,
    table: &str,
    acks: &AckList,
    sent: &HashMap<LocalId, BTreeMap<String, Value>>,
) -> StoreResult<usize> {
    let rows = txn.rows(table);
    let mut by_local_id: HashMap<LocalId, Row> = HashMap::with_capacity(rows.len());
    let mut server_ids: HashMap<i64, LocalId> = HashMap::new();
    for row in rows {
        if let Some(id) = row.meta.server_id {
            server_ids.insert(id, row.meta.local_id.clone());
        }
        by_local_id.insert(row.meta.local_id.clone(), row);
    }

    let mut confirmed = 0;
    for ack in &acks.acks {
        let correlation = LocalId::from(ack.correlation_id.as_str());
        let local_id = if by_local_id.contains_key(&correlation) {
            correlation
        } else if let Some(id) = server_ids.get(&ack.server_id) {
            id.clone()
        } else {
            warn!(table, server_id = ack.server_id, correlation_id = %ack.correlation_id, "ack matches no record");
            continue;
        };

        if let Some(owner) = server_ids.get(&ack.server_id) {
            if *owner != local_id {
                warn!(table, server_id = ack.server_id, %local_id, "server id already assigned to another record");
                continue;
            }
        }

        let Some(row) = by_local_id.get_mut(&local_id) else {
            continue;
        };
        row.meta.server_id = Some(ack.server_id);
        if row.meta.status.is_dirty() {
            if sent.get(&local_id) == Some(&row.values) {
                row.meta.status = SyncStatus::Current;
            } else {
                debug!(table, %local_id, "record changed during push, keeping it dirty");
                row.meta.status = SyncStatus::Updated;
            }
        }
        txn.put_row(table, row.clone())?;
        server_ids.insert(ack.server_id, local_id);
        confirmed += 1;
    }

    for line in &acks.rejected_lines {
        warn!(table, line = %line, "unreadable ack line");
    }

    Ok(confirmed)
}

/// Hard-deletes rows whose deletion the server accepted, returning the
/// number removed. Rows no longer marked `deleted` are kept.
pub(crate) fn apply_deletions(
    txn: &mut Transaction<'_>,
    table: &str,
    sent: &[LocalId],
) -> StoreResult<usize> {
    let mut removed = 0;
    for local_id in sent {
        let still_deleted = txn
            .row(table, local_id)
            .is_some_and(|row| row.meta.status == SyncStatus::Deleted);
        if still_deleted {
            txn.delete_row(table, local_id)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Hard-deletes tombstones that never reached the server. A row that got a
/// server id in the meantime is left for the next delete push.
pub(crate) fn purge_unsent(
    txn: &mut Transaction<'_>,
    table: &str,
    local_ids: &[LocalId],
) -> StoreResult<usize> {
    let mut removed = 0;
    for local_id in local_ids {
        let unsent = txn.row(table, local_id).is_some_and(|row| {
            row.meta.status == SyncStatus::Deleted && !row.meta.is_known_to_server()
        });
        if unsent {
            txn.delete_row(table, local_id)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablesync_codec::{FieldDef, FieldType};
    use tablesync_core::{InMemoryStore, LocalStore};

    fn codec() -> RecordCodec {
        RecordCodec::new(vec![
            FieldDef::new("title", FieldType::String),
            FieldDef::new("pageCount", FieldType::Int),
        ])
    }

    fn pull(store: &InMemoryStore, body: &str) -> ReadApply {
        let payload = ReadPayload::parse(body).unwrap();
        store
            .transaction(|txn| apply_read(txn, "Book", &codec(), &payload))
            .unwrap()
    }

    fn titles(store: &InMemoryStore) -> Vec<(i64, String, bool)> {
        store.read(|v| {
            v.rows("Book")
                .into_iter()
                .map(|r| {
                    (
                        r.meta.server_id.unwrap_or_default(),
                        r.values
                            .get("title")
                            .and_then(|t| t.as_text())
                            .unwrap_or_default()
                            .to_string(),
                        r.meta.soft_deleted,
                    )
                })
                .collect()
        })
    }

    #[test]
    fn creates_then_updates() {
        let store = InMemoryStore::new();
        let first = pull(&store, "m|2024-01-01T00:00:00Z\nid|title\n1|Alice\n2|Bob");
        assert_eq!(first.created, 2);
        assert!(first.changed());

        let second = pull(&store, "m|2024-01-02T00:00:00Z\nid|title\n1|Alicia\n2|Bob");
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 1);
        assert_eq!(
            titles(&store),
            vec![(1, "Alicia".into(), false), (2, "Bob".into(), false)]
        );
    }

    #[test]
    fn replay_is_idempotent() {
        let store = InMemoryStore::new();
        let body = "m|2024-01-01T00:00:00Z\nid|title|page_count\n1|Alice|10\n2|Bob|";
        pull(&store, body);
        let replay = pull(&store, body);
        assert!(!replay.changed());
        assert_eq!(store.row_count("Book"), 2);
    }

    #[test]
    fn deletions_soft_delete_and_restore() {
        let store = InMemoryStore::new();
        pull(&store, "m|2024-01-01T00:00:00Z\nid|title\n1|Alice\n2|Bob");

        let deleted = pull(&store, "m|2024-01-02T00:00:00Z\nid|title|delete\n1||true\n9||true");
        assert_eq!(deleted.soft_deleted, 1);
        assert_eq!(store.row_count("Book"), 2);
        assert!(titles(&store)[0].2);

        let again = pull(&store, "m|2024-01-03T00:00:00Z\nid|title|delete\n1||true");
        assert!(!again.changed());

        let restored = pull(&store, "m|2024-01-04T00:00:00Z\nid|title|delete\n1|Alice|false");
        assert_eq!(restored.restored, 1);
        assert!(!titles(&store)[0].2);
    }

    #[test]
    fn pulled_update_keeps_status() {
        let store = InMemoryStore::new();
        pull(&store, "m|2024-01-01T00:00:00Z\nid|title\n1|Alice");
        store
            .transaction(|txn| {
                let mut row = txn.row_by_server_id("Book", 1).unwrap();
                row.meta.status = SyncStatus::Updated;
                txn.put_row("Book", row)
            })
            .unwrap();

        pull(&store, "m|2024-01-02T00:00:00Z\nid|title\n1|Alicia");
        let row = store.read(|v| v.row_by_server_id("Book", 1)).unwrap();
        assert_eq!(row.meta.status, SyncStatus::Updated);
        assert_eq!(row.values["title"], Value::from("Alicia"));
    }

    fn sent(rows: &[&Row]) -> HashMap<LocalId, BTreeMap<String, Value>> {
        rows.iter()
            .map(|r| (r.meta.local_id.clone(), r.values.clone()))
            .collect()
    }

    #[test]
    fn acks_match_by_correlation_or_server_id() {
        let store = InMemoryStore::new();
        let mut fresh = Row::new(SyncMeta::created(), BTreeMap::new());
        fresh.meta.local_id = LocalId::from("abc-123");
        let mut known = Row::new(SyncMeta::pulled(5), BTreeMap::new());
        known.meta.status = SyncStatus::Updated;
        let batch = sent(&[&fresh, &known]);
        store
            .transaction(|txn| {
                txn.put_row("Book", fresh)?;
                txn.put_row("Book", known)
            })
            .unwrap();

        let acks = AckList::parse("id|clientId\n1|abc-123\n5|not-a-local-id\n77|nobody");
        let confirmed = store
            .transaction(|txn| apply_acks(txn, "Book", &acks, &batch))
            .unwrap();
        assert_eq!(confirmed, 2);

        let rows = store.read(|v| v.rows("Book"));
        assert!(rows.iter().all(|r| r.meta.status == SyncStatus::Current));
        assert_eq!(rows[0].meta.server_id, Some(1));
        assert_eq!(rows[1].meta.server_id, Some(5));
    }

    #[test]
    fn ack_keeps_deleted_status() {
        let store = InMemoryStore::new();
        let mut row = Row::new(SyncMeta::created(), BTreeMap::new());
        row.meta.status = SyncStatus::Deleted;
        let id = row.meta.local_id.clone();
        let batch = sent(&[&row]);
        store.transaction(|txn| txn.put_row("Book", row)).unwrap();

        let acks = AckList::parse(&format!("3|{id}"));
        store
            .transaction(|txn| apply_acks(txn, "Book", &acks, &batch))
            .unwrap();
        let row = store.read(|v| v.row("Book", &id)).unwrap();
        assert_eq!(row.meta.status, SyncStatus::Deleted);
        assert_eq!(row.meta.server_id, Some(3));
    }

    #[test]
    fn conflicting_server_id_is_skipped() {
        let store = InMemoryStore::new();
        let owner = Row::new(SyncMeta::pulled(1), BTreeMap::new());
        let mut other = Row::new(SyncMeta::created(), BTreeMap::new());
        other.meta.local_id = LocalId::from("other");
        let batch = sent(&[&other]);
        store
            .transaction(|txn| {
                txn.put_row("Book", owner)?;
                txn.put_row("Book", other)
            })
            .unwrap();

        let acks = AckList::parse("1|other");
        let confirmed = store
            .transaction(|txn| apply_acks(txn, "Book", &acks, &batch))
            .unwrap();
        assert_eq!(confirmed, 0);
    }

    #[test]
    fn ack_of_edited_row_keeps_it_dirty() {
        let store = InMemoryStore::new();
        let mut values = BTreeMap::new();
        values.insert("title".to_string(), Value::from("Old"));
        let row = Row::new(SyncMeta::created(), values);
        let id = row.meta.local_id.clone();
        let batch = sent(&[&row]);

        let mut edited = row.clone();
        edited.values.insert("title".to_string(), Value::from("New"));
        store.transaction(|txn| txn.put_row("Book", edited)).unwrap();

        let acks = AckList::parse(&format!("4|{id}"));
        let confirmed = store
            .transaction(|txn| apply_acks(txn, "Book", &acks, &batch))
            .unwrap();
        assert_eq!(confirmed, 1);

        let row = store.read(|v| v.row("Book", &id)).unwrap();
        assert_eq!(row.meta.server_id, Some(4));
        assert_eq!(row.meta.status, SyncStatus::Updated);
        assert_eq!(row.values["title"], Value::from("New"));
    }

    #[test]
    fn purge_unsent_keeps_acknowledged_tombstones() {
        let store = InMemoryStore::new();
        let mut unsent = Row::new(SyncMeta::created(), BTreeMap::new());
        unsent.meta.status = SyncStatus::Deleted;
        let mut acked = Row::new(SyncMeta::created(), BTreeMap::new());
        acked.meta.status = SyncStatus::Deleted;
        acked.meta.server_id = Some(8);
        let live = Row::new(SyncMeta::created(), BTreeMap::new());
        let ids = vec![
            unsent.meta.local_id.clone(),
            acked.meta.local_id.clone(),
            live.meta.local_id.clone(),
        ];
        store
            .transaction(|txn| {
                txn.put_row("Book", unsent)?;
                txn.put_row("Book", acked)?;
                txn.put_row("Book", live)
            })
            .unwrap();

        let removed = store
            .transaction(|txn| purge_unsent(txn, "Book", &ids))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.row_count("Book"), 2);
        assert!(store.read(|v| v.row("Book", &ids[0])).is_none());
    }

    #[test]
    fn deletions_skip_revived_rows() {
        let store = InMemoryStore::new();
        let mut gone = Row::new(SyncMeta::pulled(1), BTreeMap::new());
        gone.meta.status = SyncStatus::Deleted;
        let revived = Row::new(SyncMeta::pulled(2), BTreeMap::new());
        let ids = vec![gone.meta.local_id.clone(), revived.meta.local_id.clone()];
        store
            .transaction(|txn| {
                txn.put_row("Book", gone)?;
                txn.put_row("Book", revived)
            })
            .unwrap();

        let removed = store
            .transaction(|txn| apply_deletions(txn, "Book", &ids))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.row_count("Book"), 1);
    }
}
