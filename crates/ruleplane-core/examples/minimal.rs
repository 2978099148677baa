// crates/ruleplane-core/examples/minimal.rs
// ============================================================================
// Module: Ruleplane Minimal Example
// Description: Minimal rule lifecycle against the in-memory store.
// Purpose: Demonstrate writes, the owner cursor, and incremental refresh.
// Dependencies: ruleplane-core
// ============================================================================

//! ## Overview
//! Writes a rule, updates it, refreshes a [`RuleCache`], then deletes the
//! rule and refreshes again so the tombstone evicts the cached copy. Uses the
//! in-memory store so it runs without any database.

#![allow(clippy::print_stdout, reason = "Example output goes to stdout.")]

use std::sync::Arc;

use ruleplane_core::InMemoryRateLimitStore;
use ruleplane_core::ManualClock;
use ruleplane_core::OwnerId;
use ruleplane_core::RateLimitRule;
use ruleplane_core::RateLimitStore;
use ruleplane_core::RuleCache;
use ruleplane_core::RuleId;
use ruleplane_core::RuleSyncReader;
use ruleplane_core::Timestamp;

/// Runs the lifecycle walk-through.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_seconds(1_700_000_000)));
    let store = InMemoryRateLimitStore::with_clock(clock.clone());
    let owner = OwnerId::from("checkout");

    let rule = RateLimitRule::new("checkout-qps", owner.clone(), "v1")
        .with_labels("env=prod")
        .with_body("{\"max_requests\":100,\"window_ms\":1000}");
    store.create_rule(&rule)?;
    clock.advance(1);
    store.update_rule(&rule.clone().with_revision("v2").with_priority(5))?;

    let mut cache = RuleCache::default();
    let report = cache.refresh(&store)?;
    let cursor = store.revision_cursor(&owner)?.map(|cursor| cursor.last_revision);
    println!("first refresh: {}", serde_json::to_string(&report)?);
    println!("owner cursor: {}", serde_json::to_string(&cursor)?);

    clock.advance(1);
    store.delete_rule(&rule.with_revision("v3"))?;
    let report = cache.refresh(&store)?;
    let cached = cache.get(&RuleId::from("checkout-qps")).is_some();
    println!("second refresh: {}", serde_json::to_string(&report)?);
    println!("still cached: {cached}");
    Ok(())
}
