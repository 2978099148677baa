// crates/ruleplane-core/tests/rule_cache.rs
// ============================================================================
// Module: Rule Cache and In-Memory Store Tests
// Description: Lifecycle scenarios and incremental refresh behavior.
// Purpose: Validate tombstone visibility, watermarks, and cache convergence.
// ============================================================================

//! Scenario tests for the in-memory store and the incremental rule cache.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;

use ruleplane_core::InMemoryRateLimitStore;
use ruleplane_core::ManualClock;
use ruleplane_core::OwnerId;
use ruleplane_core::RateLimitRule;
use ruleplane_core::RateLimitStore;
use ruleplane_core::Revision;
use ruleplane_core::RuleCache;
use ruleplane_core::RuleCacheConfig;
use ruleplane_core::RuleFilter;
use ruleplane_core::RuleId;
use ruleplane_core::RuleSyncReader;
use ruleplane_core::StatusCode;
use ruleplane_core::Timestamp;
use ruleplane_core::TombstonePolicy;

fn store() -> (InMemoryRateLimitStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_seconds(1_000)));
    (InMemoryRateLimitStore::with_clock(clock.clone()), clock)
}

fn cursor(store: &InMemoryRateLimitStore, owner: &str) -> String {
    store.revision_cursor(&OwnerId::new(owner)).unwrap().unwrap().last_revision.to_string()
}

#[test]
fn create_update_delete_scenario() {
    let (store, clock) = store();
    let rule = RateLimitRule::new("r1", "svcA", "v1");
    store.create_rule(&rule).unwrap();
    assert_eq!(cursor(&store, "svcA"), "v1");

    clock.advance(1);
    store.update_rule(&rule.clone().with_revision("v2")).unwrap();
    let fetched = store.get_rule(&RuleId::new("r1")).unwrap().unwrap();
    assert_eq!(fetched.revision, Revision::new("v2"));
    assert_eq!(cursor(&store, "svcA"), "v2");

    clock.advance(1);
    store.delete_rule(&rule.with_revision("v3")).unwrap();
    let fetched = store.get_rule(&RuleId::new("r1")).unwrap().unwrap();
    assert!(!fetched.valid);
    assert_eq!(fetched.revision, Revision::new("v3"));
    assert_eq!(cursor(&store, "svcA"), "v3");

    let filter = RuleFilter::from_pairs([("owner_id", "svcA")]).unwrap();
    let page = store.list_rules(&filter, 0, 10).unwrap();
    assert_eq!(page.total, 0);
    assert!(page.rules.is_empty());
}

#[test]
fn tombstones_are_pulled_and_reclaimed_only_when_invalid() {
    let (store, clock) = store();
    let rule = RateLimitRule::new("r1", "svcA", "v1");
    store.create_rule(&rule).unwrap();
    assert!(!store.reclaim_rule(&rule.id).unwrap());
    assert!(store.get_rule(&rule.id).unwrap().unwrap().valid);

    clock.advance(5);
    store.delete_rule(&rule.clone().with_revision("v2")).unwrap();
    let before_delete = Timestamp::from_unix_seconds(1_004);
    let batch = store.pull_since(before_delete, TombstonePolicy::Include).unwrap();
    assert_eq!(batch.len(), 1);
    assert!(!batch.changes[0].rule.valid);
    assert_eq!(batch.changes[0].owner_revision, Revision::new("v2"));
    assert!(store.pull_since(before_delete, TombstonePolicy::Exclude).unwrap().is_empty());

    let err = store.create_rule(&rule).unwrap_err();
    assert_eq!(err.code(), StatusCode::DuplicateEntry);
    assert!(store.reclaim_rule(&rule.id).unwrap());
    assert!(store.get_rule(&rule.id).unwrap().is_none());
    store.create_rule(&rule).unwrap();
}

#[test]
fn pull_from_max_mtime_never_redelivers_unchanged_rows() {
    let (store, clock) = store();
    for id in ["a", "b", "c"] {
        store.create_rule(&RateLimitRule::new(id, "svcA", "v1")).unwrap();
        clock.advance(1);
    }
    let first = store.pull_since(Timestamp::MIN, TombstonePolicy::Include).unwrap();
    assert_eq!(first.len(), 3);
    let watermark = first.max_modify_time().unwrap();
    assert!(store.pull_since(watermark, TombstonePolicy::Include).unwrap().is_empty());

    store.update_rule(&RateLimitRule::new("b", "svcA", "v2")).unwrap();
    let second = store.pull_since(watermark, TombstonePolicy::Include).unwrap();
    let ids: Vec<&str> = second.changes.iter().map(|change| change.rule.id.as_str()).collect();
    assert_eq!(ids, ["b"]);
}

#[test]
fn list_orders_newest_first_and_counts_independently() {
    let (store, clock) = store();
    for (id, labels) in [("a", "env=prod"), ("b", "env=dev"), ("c", "env=prod,tier=1")] {
        store.create_rule(&RateLimitRule::new(id, "svcA", "v1").with_labels(labels)).unwrap();
        clock.advance(1);
    }
    let filter = RuleFilter::from_pairs([("labels", "env=prod")]).unwrap();
    let page = store.list_rules(&filter, 0, 1).unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.rules.len(), 1);
    assert_eq!(page.rules[0].id.as_str(), "c");
    let page = store.list_rules(&RuleFilter::new(), 2, 10).unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.rules[0].id.as_str(), "a");
}

#[test]
fn cache_converges_and_observes_evictions() {
    let (store, clock) = store();
    let mut cache = RuleCache::default();
    store.create_rule(&RateLimitRule::new("r1", "svcA", "v1")).unwrap();
    store.create_rule(&RateLimitRule::new("r2", "svcA", "v2")).unwrap();

    let report = cache.refresh(&store).unwrap();
    assert_eq!(report.upserted, 2);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.owner_revision(&OwnerId::new("svcA")), Some(&Revision::new("v2")));

    // Same wall-clock second as the previous pull.
    store.create_rule(&RateLimitRule::new("r3", "svcA", "v3")).unwrap();
    let report = cache.refresh(&store).unwrap();
    assert_eq!(report.upserted, 1);
    assert!(report.skipped >= 1);
    assert_eq!(cache.len(), 3);

    clock.advance(10);
    store.delete_rule(&RateLimitRule::new("r1", "svcA", "v4")).unwrap();
    let report = cache.refresh(&store).unwrap();
    assert_eq!(report.evicted, 1);
    assert!(cache.get(&RuleId::new("r1")).is_none());
    assert_eq!(cache.owner_revision(&OwnerId::new("svcA")), Some(&Revision::new("v4")));

    let report = cache.refresh(&store).unwrap();
    assert_eq!(report.upserted + report.evicted, 0);
}

#[test]
fn first_pull_can_exclude_tombstones() {
    let (store, clock) = store();
    store.create_rule(&RateLimitRule::new("live", "svcB", "v1")).unwrap();
    let gone = RateLimitRule::new("gone", "svcA", "v1");
    store.create_rule(&gone).unwrap();
    store.delete_rule(&gone.with_revision("v2")).unwrap();

    let mut cache = RuleCache::new(RuleCacheConfig {
        overlap_secs: 0,
        first_pull_tombstones: TombstonePolicy::Exclude,
    });
    let report = cache.refresh(&store).unwrap();
    assert_eq!(report.pulled, 1);
    assert_eq!(cache.len(), 1);
    assert!(cache.owner_revision(&OwnerId::new("svcA")).is_none());

    clock.advance(1);
    let late = RateLimitRule::new("late", "svcC", "v1");
    store.create_rule(&late).unwrap();
    clock.advance(1);
    store.delete_rule(&late.with_revision("v2")).unwrap();
    // Later pulls include tombstones, so the earlier tombstone past the
    // watermark arrives once even though the cache never held it live.
    let report = cache.refresh(&store).unwrap();
    assert_eq!(report.pulled, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.owner_revision(&OwnerId::new("svcA")), Some(&Revision::new("v2")));
    assert_eq!(cache.owner_revision(&OwnerId::new("svcC")), Some(&Revision::new("v2")));
}

#[test]
fn edit_burst_does_not_hide_later_rules() {
    let (store, clock) = store();
    let hot = RateLimitRule::new("r1", "svcA", "v1");
    store.create_rule(&hot).unwrap();
    for revision in ["v2", "v3", "v4"] {
        store.update_rule(&hot.clone().with_revision(revision)).unwrap();
    }
    let mut cache = RuleCache::default();
    cache.refresh(&store).unwrap();
    let first = store.pull_since(Timestamp::MIN, TombstonePolicy::Include).unwrap();
    let watermark = first.max_modify_time().unwrap();
    assert_eq!(watermark, Timestamp::from_unix_seconds(1_003));

    // The wall clock is still behind the hot row's mtime.
    clock.advance(1);
    store.create_rule(&RateLimitRule::new("r2", "svcB", "w1")).unwrap();
    let late = store.pull_since(watermark, TombstonePolicy::Include).unwrap();
    let ids: Vec<&str> = late.changes.iter().map(|change| change.rule.id.as_str()).collect();
    assert_eq!(ids, ["r2"]);
    assert!(late.changes[0].rule.modified_at > watermark);

    for _ in 0 .. 3 {
        cache.refresh(&store).unwrap();
    }
    assert!(cache.get(&RuleId::new("r2")).is_some());
    assert_eq!(cache.len(), 2);
}
