mod support;

use rusqlite::Connection;
use support::{make_event, setup_db, tokens};
use tokentop_db::{FileState, MIGRATIONS};

#[test]
fn migrate_is_idempotent_and_records_each_migration() {
    let mut test_db = setup_db();
    test_db.db.migrate().expect("second migrate");

    let conn = Connection::open(&test_db.path).expect("open conn");
    let applied: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_migration", [], |row| row.get(0))
        .expect("count migrations");
    assert_eq!(applied as usize, MIGRATIONS.len());
}

#[test]
fn store_opens_in_wal_mode() {
    let test_db = setup_db();
    let conn = Connection::open(&test_db.path).expect("open conn");
    let mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .expect("journal mode");
    assert_eq!(mode.to_ascii_lowercase(), "wal");
}

#[test]
fn insert_events_ignores_duplicate_lines() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    let events = vec![
        make_event("a.jsonl", 1, 100, "claude-sonnet-4-5", tokens(10, 5)),
        make_event("a.jsonl", 2, 110, "claude-sonnet-4-5", tokens(20, 5)),
    ];
    assert_eq!(db.insert_events(&events).expect("first insert"), 2);
    assert_eq!(db.insert_events(&events).expect("second insert"), 0);

    let same_line = make_event("a.jsonl", 2, 999, "other", tokens(1, 1));
    assert!(!db.insert_event(&same_line).expect("duplicate single"));
    let other_file = make_event("b.jsonl", 2, 999, "other", tokens(1, 1));
    assert!(db.insert_event(&other_file).expect("new single"));

    assert_eq!(db.count_events_for_file("a.jsonl").expect("count a"), 2);
    assert_eq!(db.count_events_for_file("b.jsonl").expect("count b"), 1);
    let window = db.query_window(0).expect("window");
    assert_eq!(window.totals.input_tokens, 31);
    assert_eq!(window.event_count, 3);
}

#[test]
fn insert_events_with_empty_batch_is_noop() {
    let mut test_db = setup_db();
    assert_eq!(test_db.db.insert_events(&[]).expect("empty"), 0);
}

#[test]
fn file_state_upserts_and_lists_idle_files() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    assert!(db.get_file_state("a.jsonl").expect("missing").is_none());

    db.set_file_state(&FileState {
        source_file: "a.jsonl".to_string(),
        last_line: 3,
        mtime_ns: 1_000,
        updated_at: 10,
    })
    .expect("set a");
    db.set_file_state(&FileState {
        source_file: "a.jsonl".to_string(),
        last_line: 5,
        mtime_ns: 2_000,
        updated_at: 20,
    })
    .expect("update a");
    db.set_file_state(&FileState {
        source_file: "b.jsonl".to_string(),
        last_line: 1,
        mtime_ns: 9_000,
        updated_at: 20,
    })
    .expect("set b");

    let state = db.get_file_state("a.jsonl").expect("get").expect("state");
    assert_eq!(state.last_line, 5);
    assert_eq!(state.mtime_ns, 2_000);
    assert_eq!(db.list_file_states().expect("list").len(), 2);

    let idle = db.list_idle_files(5_000).expect("idle");
    assert_eq!(idle.len(), 1);
    assert_eq!(idle[0].source_file, "a.jsonl");
    assert_eq!(idle[0].last_line, 5);
    db.mark_complete("a.jsonl", 30).expect("complete");
    assert!(db.list_idle_files(5_000).expect("idle").is_empty());

    db.delete_file_state("b.jsonl").expect("delete b");
    assert!(db.get_file_state("b.jsonl").expect("get b").is_none());
}

#[test]
fn reset_file_drops_events_bookmark_and_aggregate() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    db.insert_events(&[
        make_event("a.jsonl", 1, 100, "m", tokens(1, 1)),
        make_event("b.jsonl", 1, 100, "m", tokens(1, 1)),
    ])
    .expect("insert");
    db.set_file_state(&FileState {
        source_file: "a.jsonl".to_string(),
        last_line: 1,
        mtime_ns: 1,
        updated_at: 1,
    })
    .expect("state");
    db.mark_complete("a.jsonl", 200).expect("complete");
    db.insert_event(&make_event("a.jsonl", 2, 150, "m", tokens(1, 1)))
        .expect("late event");

    db.reset_file("a.jsonl").expect("reset");

    assert_eq!(db.count_events_for_file("a.jsonl").expect("count"), 0);
    assert!(db.get_file_state("a.jsonl").expect("state").is_none());
    assert!(db.get_file_aggregate("a.jsonl").expect("agg").is_none());
    assert_eq!(db.count_events_for_file("b.jsonl").expect("count b"), 1);
}

#[test]
fn metrics_cache_round_trips_and_reports_age() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    assert!(db.get_cached_metric("snapshot").expect("empty").is_none());

    db.set_cached_metric("snapshot", r#"{"total":1}"#, 1_000)
        .expect("set");
    db.set_cached_metric("snapshot", r#"{"total":2}"#, 2_000)
        .expect("overwrite");

    let cached = db.get_cached_metric("snapshot").expect("get").expect("entry");
    assert_eq!(cached.payload, r#"{"total":2}"#);
    assert!(cached.is_fresh(4_999, 3_000));
    assert!(!cached.is_fresh(5_000, 3_000));
}

#[test]
fn clear_all_wipes_every_table() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    db.insert_event(&make_event("a.jsonl", 1, 100, "m", tokens(1, 1)))
        .expect("insert");
    db.set_cached_metric("snapshot", "{}", 1).expect("cache");
    db.try_acquire_lease("me", 0, 5_000).expect("lease");
    db.mark_complete("b.jsonl", 1).expect("aggregate");

    db.clear_all().expect("clear");

    let stats = db.stats().expect("stats");
    assert_eq!(stats.token_events, 0);
    assert_eq!(stats.file_aggregates, 0);
    assert_eq!(stats.metrics_cache_entries, 0);
    assert!(db.current_lease().expect("lease").is_none());
}

#[test]
fn close_checkpoints_and_reopens() {
    let mut test_db = setup_db();
    test_db
        .db
        .insert_event(&make_event("a.jsonl", 1, 100, "m", tokens(4, 2)))
        .expect("insert");
    let path = test_db.path.clone();
    let support::TestDb { _dir, db, .. } = test_db;
    db.close().expect("close");

    let reopened = tokentop_db::Db::open(&path).expect("reopen");
    let stats = reopened.stats().expect("stats");
    assert_eq!(stats.token_events, 1);
    drop(_dir);
}
