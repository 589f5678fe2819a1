mod support;

use std::time::{Duration, Instant};

use rusqlite::{Connection, TransactionBehavior};
use support::{make_event, open_second, quick_retry, setup_db, tokens};
use tokentop_db::DbError;

#[test]
fn lease_is_exclusive_within_ttl() {
    let mut test_db = setup_db();
    let mut other = open_second(&test_db.path, quick_retry());

    assert!(test_db.db.try_acquire_lease("alpha", 1_000, 5_000).expect("alpha"));
    assert!(!other.try_acquire_lease("beta", 1_001, 5_000).expect("beta blocked"));

    let lease = other.current_lease().expect("lease").expect("held");
    assert_eq!(lease.holder_id, "alpha");
    assert_eq!(lease.expires_at_ms, 6_000);
    assert!(!lease.is_expired(5_999));
}

#[test]
fn holder_renews_and_keeps_acquired_time() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    assert!(db.try_acquire_lease("alpha", 1_000, 5_000).expect("acquire"));
    assert!(db.try_acquire_lease("alpha", 4_000, 5_000).expect("renew"));

    let lease = db.current_lease().expect("lease").expect("held");
    assert_eq!(lease.acquired_at_ms, 1_000);
    assert_eq!(lease.expires_at_ms, 9_000);
}

#[test]
fn expired_lease_can_be_taken_over() {
    let mut test_db = setup_db();
    let mut other = open_second(&test_db.path, quick_retry());
    assert!(test_db.db.try_acquire_lease("alpha", 1_000, 5_000).expect("alpha"));
    assert!(other.try_acquire_lease("beta", 6_000, 5_000).expect("beta after expiry"));

    let lease = test_db.db.current_lease().expect("lease").expect("held");
    assert_eq!(lease.holder_id, "beta");
    assert_eq!(lease.acquired_at_ms, 6_000);
    assert!(!test_db.db.try_acquire_lease("alpha", 6_001, 5_000).expect("alpha blocked"));
}

#[test]
fn release_only_removes_own_lease() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    assert!(db.try_acquire_lease("alpha", 0, 5_000).expect("acquire"));
    assert!(!db.release_lease("beta").expect("foreign release"));
    assert!(db.current_lease().expect("lease").is_some());
    assert!(db.release_lease("alpha").expect("own release"));
    assert!(db.try_acquire_lease("beta", 1, 5_000).expect("beta immediately"));
}

#[test]
fn writes_fail_within_deadline_while_another_writer_holds_the_lock() {
    let test_db = setup_db();
    let mut contender = open_second(&test_db.path, quick_retry());
    let mut blocker = Connection::open(&test_db.path).expect("blocker conn");
    let tx = blocker
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .expect("hold write lock");

    let started = Instant::now();
    let err = contender
        .insert_event(&make_event("a.jsonl", 1, 1, "m", tokens(1, 1)))
        .expect_err("locked");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(err.is_contention() || matches!(err, DbError::Timeout { .. }));

    let window = test_db.db.query_window(0).expect("readers are not blocked");
    assert_eq!(window.event_count, 0);

    tx.rollback().expect("release lock");
    assert!(contender
        .insert_event(&make_event("a.jsonl", 1, 1, "m", tokens(1, 1)))
        .expect("insert after release"));
}
