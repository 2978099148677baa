// crates/ruleplane-store-sqlite/tests/sqlite_sync.rs
// ============================================================================
// Module: SQLite Sync and Contention Tests
// Description: Watermark pulls, cache refresh, and concurrent writers.
// Purpose: Validate incremental sync and retry behavior against real SQLite.
// ============================================================================

//! ## Overview
//! Integration tests that exercise the store from several threads and drive a
//! [`RuleCache`] through the `SQLite` sync reader.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rusqlite::Connection;
use ruleplane_core::ManualClock;
use ruleplane_core::OwnerId;
use ruleplane_core::RateLimitRule;
use ruleplane_core::RateLimitStore;
use ruleplane_core::RetryPolicy;
use ruleplane_core::Revision;
use ruleplane_core::RuleCache;
use ruleplane_core::RuleCacheConfig;
use ruleplane_core::RuleId;
use ruleplane_core::RuleSyncReader;
use ruleplane_core::StatusCode;
use ruleplane_core::Timestamp;
use ruleplane_core::TombstonePolicy;
use ruleplane_store_sqlite::SqliteRateLimitStore;
use ruleplane_store_sqlite::SqliteStoreConfig;
use tempfile::TempDir;

fn config(dir: &TempDir) -> SqliteStoreConfig {
    SqliteStoreConfig::new(dir.path().join("rules.sqlite"))
}

// ============================================================================
// SECTION: Pull Since
// ============================================================================

#[test]
fn pull_since_never_redelivers_at_the_watermark() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_seconds(1_000)));
    let store = SqliteRateLimitStore::new(config(&dir)).unwrap().with_clock(clock.clone());
    store.create_rule(&RateLimitRule::new("a", "svcA", "v1")).unwrap();
    clock.advance(5);
    store.create_rule(&RateLimitRule::new("b", "svcB", "w1")).unwrap();

    let batch = store.pull_since(Timestamp::UNIX_EPOCH, TombstonePolicy::Include).unwrap();
    let ids: Vec<&str> = batch.changes.iter().map(|change| change.rule.id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);
    let watermark = batch.max_modify_time().unwrap();
    assert_eq!(watermark, Timestamp::from_unix_seconds(1_005));
    assert!(store.pull_since(watermark, TombstonePolicy::Include).unwrap().is_empty());

    clock.advance(5);
    store.update_rule(&RateLimitRule::new("a", "svcA", "v2")).unwrap();
    let batch = store.pull_since(watermark, TombstonePolicy::Include).unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch.changes[0].rule.revision, Revision::new("v2"));
    assert_eq!(batch.changes[0].owner_revision, Revision::new("v2"));
}

#[test]
fn pull_reports_the_owner_cursor_not_the_row_revision() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_seconds(1_000)));
    let store = SqliteRateLimitStore::new(config(&dir)).unwrap().with_clock(clock.clone());
    store.create_rule(&RateLimitRule::new("a", "svcA", "v1")).unwrap();
    clock.advance(1);
    store.create_rule(&RateLimitRule::new("b", "svcA", "v2")).unwrap();
    let batch = store.pull_since(Timestamp::UNIX_EPOCH, TombstonePolicy::Include).unwrap();
    assert_eq!(batch.changes[0].rule.revision, Revision::new("v1"));
    assert!(batch.changes.iter().all(|change| change.owner_revision == Revision::new("v2")));
}

#[test]
fn cache_converges_with_sqlite_store() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_seconds(5_000)));
    let store = SqliteRateLimitStore::new(config(&dir)).unwrap().with_clock(clock.clone());
    let mut cache = RuleCache::new(RuleCacheConfig::default());

    store.create_rule(&RateLimitRule::new("r1", "svcA", "v1")).unwrap();
    store.create_rule(&RateLimitRule::new("r2", "svcA", "v2")).unwrap();
    let report = cache.refresh(&store).unwrap();
    assert_eq!(report.upserted, 2);
    assert_eq!(cache.len(), 2);

    clock.advance(10);
    store.delete_rule(&RateLimitRule::new("r1", "svcA", "v3")).unwrap();
    cache.refresh(&store).unwrap();
    assert!(cache.get(&RuleId::new("r1")).is_none());
    assert_eq!(cache.owner_revision(&OwnerId::new("svcA")), Some(&Revision::new("v3")));

    clock.advance(10);
    let report = cache.refresh(&store).unwrap();
    assert_eq!(report.upserted, 0);
    assert_eq!(report.evicted, 0);
    assert_eq!(cache.len(), 1);
}

// ============================================================================
// SECTION: Concurrency
// ============================================================================

#[test]
fn concurrent_writers_leave_cursor_at_the_last_commit() {
    let dir = TempDir::new().unwrap();
    let store = SqliteRateLimitStore::new(config(&dir)).unwrap();
    let writers = 4;
    let per_writer = 10;
    let handles: Vec<_> = (0 .. writers)
        .map(|writer| {
            let store = store.clone();
            thread::spawn(move || {
                for seq in 0 .. per_writer {
                    let id = format!("w{writer}-{seq}");
                    let rule = RateLimitRule::new(id.clone(), "shared", format!("{id}-c"));
                    store.create_rule(&rule).unwrap();
                    store.update_rule(&rule.clone().with_revision(format!("{id}-u"))).unwrap();
                    if seq % 2 == 0 {
                        store.delete_rule(&rule.with_revision(format!("{id}-d"))).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let batch = store.pull_since(Timestamp::MIN, TombstonePolicy::Include).unwrap();
    assert_eq!(batch.len(), writers * per_writer);
    // Stamps are issued under the write lock, so they give the commit order.
    let mut stamps: Vec<Timestamp> =
        batch.changes.iter().map(|change| change.rule.modified_at).collect();
    stamps.dedup();
    assert_eq!(stamps.len(), batch.len(), "every row carries a distinct stamp");
    let last_commit = batch.changes.last().unwrap();
    assert_eq!(last_commit.rule.modified_at, batch.max_modify_time().unwrap());

    let cursor = store.revision_cursor(&OwnerId::new("shared")).unwrap().unwrap();
    assert_eq!(cursor.last_revision, last_commit.rule.revision);
    assert_eq!(cursor.modified_at, last_commit.rule.modified_at);
    assert!(batch.changes.iter().all(|change| change.owner_revision == cursor.last_revision));
}

#[test]
fn concurrent_updates_to_one_rule_do_not_hide_other_rules() {
    let dir = TempDir::new().unwrap();
    let store = SqliteRateLimitStore::new(config(&dir)).unwrap();
    store.create_rule(&RateLimitRule::new("hot", "svcA", "v0")).unwrap();
    let start = store.get_rule(&RuleId::new("hot")).unwrap().unwrap().modified_at;
    let handles: Vec<_> = (0 .. 3)
        .map(|writer| {
            let store = store.clone();
            thread::spawn(move || {
                for seq in 0 .. 5 {
                    let rule = RateLimitRule::new("hot", "svcA", format!("t{writer}-{seq}"));
                    store.update_rule(&rule).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let end = store.get_rule(&RuleId::new("hot")).unwrap().unwrap();
    assert!(end.modified_at > start);
    let cursor = store.revision_cursor(&OwnerId::new("svcA")).unwrap().unwrap();
    assert_eq!(cursor.last_revision, end.revision);

    let watermark = end.modified_at;
    store.create_rule(&RateLimitRule::new("cold", "svcB", "w1")).unwrap();
    let batch = store.pull_since(watermark, TombstonePolicy::Include).unwrap();
    let ids: Vec<&str> = batch.changes.iter().map(|change| change.rule.id.as_str()).collect();
    assert_eq!(ids, ["cold"]);
}

#[test]
fn edit_burst_does_not_hide_later_rules() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_seconds(1_000)));
    let store = SqliteRateLimitStore::new(config(&dir)).unwrap().with_clock(clock.clone());
    let hot = RateLimitRule::new("r1", "svcA", "v1");
    store.create_rule(&hot).unwrap();
    for revision in ["v2", "v3", "v4"] {
        store.update_rule(&hot.clone().with_revision(revision)).unwrap();
    }
    let mut cache = RuleCache::new(RuleCacheConfig::default());
    cache.refresh(&store).unwrap();
    let first = store.pull_since(Timestamp::MIN, TombstonePolicy::Include).unwrap();
    let watermark = first.max_modify_time().unwrap();
    assert_eq!(watermark, Timestamp::from_unix_seconds(1_003));

    clock.advance(1);
    store.create_rule(&RateLimitRule::new("r2", "svcB", "w1")).unwrap();
    let late = store.pull_since(watermark, TombstonePolicy::Include).unwrap();
    assert_eq!(late.len(), 1);
    assert_eq!(late.changes[0].rule.id, RuleId::new("r2"));
    assert!(late.changes[0].rule.modified_at > watermark);

    for _ in 0 .. 3 {
        cache.refresh(&store).unwrap();
    }
    assert!(cache.get(&RuleId::new("r2")).is_some());
    assert_eq!(cache.len(), 2);
}

#[test]
fn held_write_lock_exhausts_retries_as_deadlock() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.busy_timeout_ms = 1;
    let store = SqliteRateLimitStore::new(config.clone())
        .unwrap()
        .with_retry_policy(RetryPolicy::new(3, Duration::ZERO));

    let blocker = Connection::open(&config.path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE;").unwrap();
    let err = store.create_rule(&RateLimitRule::new("r1", "svcA", "v1")).unwrap_err();
    assert_eq!(err.code(), StatusCode::Deadlock);
    assert!(err.is_retryable());
    blocker.execute_batch("ROLLBACK;").unwrap();

    store.create_rule(&RateLimitRule::new("r1", "svcA", "v1")).unwrap();
}
