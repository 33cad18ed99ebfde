//! Property tests: convergence with a loopback server and read idempotence.

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tablesync_core::{SyncEntity, SyncStatus};
use tablesync_engine::{HttpResponse, StaticTokenProvider};
use tablesync_testkit::prelude::*;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn apply_local(env: &TestEnv<FakeServer>, ops: &[LocalOp]) {
    let books = env.books();
    for op in ops {
        let live = books.all();
        match op {
            LocalOp::Insert(book) => {
                books.insert(book).unwrap();
            }
            LocalOp::Update(i, book) if !live.is_empty() => {
                books.update(&live[i % live.len()].meta.local_id, book).unwrap();
            }
            LocalOp::Delete(i) if !live.is_empty() => {
                books.delete(&live[i % live.len()].meta.local_id).unwrap();
            }
            _ => {}
        }
    }
}

fn apply_remote(server: &FakeServer, ops: &[RemoteOp]) {
    for op in ops {
        let rows = server.rows("Book");
        match op {
            RemoteOp::Insert(title) => {
                server.insert_remote("Book", &[("title", title.as_str())]);
            }
            RemoteOp::Retitle(i, title) if !rows.is_empty() => {
                server.update_remote("Book", rows[i % rows.len()].id, "title", title);
            }
            RemoteOp::Delete(i) if !rows.is_empty() => {
                server.delete_remote("Book", rows[i % rows.len()].id);
            }
            _ => {}
        }
    }
}

fn local_view(env: &TestEnv<FakeServer>) -> BTreeSet<(i64, String)> {
    env.books()
        .all()
        .into_iter()
        .map(|r| {
            assert_eq!(r.meta.status, SyncStatus::Current);
            (r.meta.server_id.unwrap(), r.entity.title)
        })
        .collect()
}

fn server_view(server: &FakeServer) -> BTreeSet<(i64, String)> {
    server
        .rows("Book")
        .into_iter()
        .map(|r| (r.id, r.values.get("title").cloned().unwrap_or_default()))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn sync_converges_with_server(
        remote_before in remote_ops_strategy(12),
        local in local_ops_strategy(16),
        remote_after in remote_ops_strategy(12),
    ) {
        let rt = runtime();
        let server = Arc::new(FakeServer::new().with_table("Book", BOOK_COLUMNS));
        let env = TestEnv::build(
            Arc::clone(&server),
            Arc::new(StaticTokenProvider::new("test-token")),
            fast_config(),
        );

        apply_remote(&server, &remote_before);
        prop_assert!(rt.block_on(env.controller.sync(&["Book"])).is_success());

        apply_local(&env, &local);
        apply_remote(&server, &remote_after);
        prop_assert!(rt.block_on(env.controller.sync(&["Book"])).is_success());

        prop_assert_eq!(local_view(&env), server_view(&server));

        let again = rt.block_on(env.controller.sync(&["Book"]));
        prop_assert!(matches!(again.table("Book").unwrap().read, Ok(false)));
    }

    #[test]
    fn replayed_read_is_idempotent(books in prop::collection::vec(book_strategy(), 0..20)) {
        let rt = runtime();
        let env = TestEnv::mock();

        let codec = book_schema().codec();
        let mut lines = vec![format!("meta|{}", wire_time(60))];
        let mut header: Vec<String> = Vec::new();
        for (i, book) in books.iter().enumerate() {
            let record = codec.export(Some(i as i64 + 1), "ignored", &book.to_values());
            if header.is_empty() {
                header = record.fields.iter().map(|(k, _)| k.clone()).collect();
                lines.push(header.join("|"));
            }
            lines.push(
                record.fields.iter().map(|(_, v)| v.as_str()).collect::<Vec<_>>().join("|"),
            );
        }
        if header.is_empty() {
            lines.push("id|title".to_string());
        }
        let body = lines.join("\n");

        env.http.push_read(Ok(HttpResponse::ok(body.clone())));
        env.http.push_read(Ok(HttpResponse::ok(body)));

        let first = rt.block_on(env.controller.read_sync("Book", None)).unwrap();
        prop_assert_eq!(first, !books.is_empty());
        let second = rt.block_on(env.controller.read_sync("Book", None)).unwrap();
        prop_assert!(!second);
        prop_assert_eq!(env.store.row_count("Book"), books.len());

        for (i, book) in books.iter().enumerate() {
            let stored = env.books().get_by_server_id(i as i64 + 1).unwrap().entity;
            prop_assert_eq!(stored.title.as_str(), book.title.as_str());
            prop_assert_eq!(stored.page_count, book.page_count);
            prop_assert_eq!(stored.rating, book.rating);
            prop_assert_eq!(stored.published_at, book.published_at);
        }
    }
}
