// crates/ruleplane-core/src/runtime/memory.rs
// ============================================================================
// Module: Ruleplane In-Memory Store
// Description: Mutex-guarded rule store with relational store semantics.
// Purpose: Provide a dependency-free store for tests and embedded use.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`InMemoryRateLimitStore`] applies each mutation, including the owner
//! cursor upsert, under one mutex so it is atomic with respect to every other
//! call. Error kinds, tombstone behavior, and ordering match the SQLite store.
//!
//! Modification times come from one store-wide stamp, `MAX(now, last + 1)`,
//! so every write lands strictly above every mtime a reader could already
//! have used as a watermark, whichever rule it touches.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::Clock;
use crate::core::OwnerId;
use crate::core::RateLimitRule;
use crate::core::RevisionCursor;
use crate::core::RuleChange;
use crate::core::RuleFilter;
use crate::core::RuleId;
use crate::core::RulePage;
use crate::core::StatusCode;
use crate::core::StatusError;
use crate::core::SyncBatch;
use crate::core::SystemClock;
use crate::core::Timestamp;
use crate::core::TombstonePolicy;
use crate::interfaces::RateLimitStore;
use crate::interfaces::RuleSyncReader;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Rules and cursors guarded together.
#[derive(Debug, Default)]
struct MemoryState {
    /// Rules by id, live and tombstoned.
    rules: BTreeMap<RuleId, RateLimitRule>,
    /// Revision cursors by owner.
    cursors: BTreeMap<OwnerId, RevisionCursor>,
    /// Highest mtime ever issued; survives reclamation of that row.
    high_water: Timestamp,
}

impl MemoryState {
    /// Issues the next store-wide modification time.
    fn next_stamp(&mut self, now: Timestamp) -> Timestamp {
        self.high_water = now.max(self.high_water.saturating_add_seconds(1));
        self.high_water
    }

    /// Moves the owner's cursor to `revision`, never moving its time backwards.
    fn upsert_cursor(&mut self, rule: &RateLimitRule, at: Timestamp) {
        let cursor = self.cursors.entry(rule.owner_id.clone()).or_insert_with(|| RevisionCursor {
            owner_id: rule.owner_id.clone(),
            last_revision: rule.revision.clone(),
            modified_at: at,
        });
        cursor.last_revision = rule.revision.clone();
        cursor.modified_at = cursor.modified_at.max(at);
    }
}

/// In-memory rate-limit rule store.
#[derive(Debug, Clone)]
pub struct InMemoryRateLimitStore {
    /// Shared state.
    state: Arc<Mutex<MemoryState>>,
    /// Time source for ctime/mtime.
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRateLimitStore {
    /// Creates an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store on an explicit clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            clock,
        }
    }

    /// Locks the state, mapping poisoning to `Unknown`.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StatusError> {
        self.state
            .lock()
            .map_err(|_| StatusError::new(StatusCode::Unknown, "rule store mutex poisoned"))
    }
}

/// Error for mutations that matched nothing.
fn no_rows(op: &str, rule: &RateLimitRule) -> StatusError {
    StatusError::new(
        StatusCode::AffectedRowsMismatch,
        format!("{op} matched no rule with id {} for owner {}", rule.id, rule.owner_id),
    )
}

impl RuleSyncReader for InMemoryRateLimitStore {
    fn pull_since(
        &self,
        watermark: Timestamp,
        tombstones: TombstonePolicy,
    ) -> Result<SyncBatch, StatusError> {
        let state = self.lock()?;
        let mut changes: Vec<RuleChange> = state
            .rules
            .values()
            .filter(|rule| rule.modified_at > watermark)
            .filter(|rule| rule.valid || tombstones.includes_tombstones())
            .filter_map(|rule| {
                state.cursors.get(&rule.owner_id).map(|cursor| RuleChange {
                    rule: rule.clone(),
                    owner_revision: cursor.last_revision.clone(),
                })
            })
            .collect();
        changes.sort_by(|a, b| {
            a.rule.modified_at.cmp(&b.rule.modified_at).then_with(|| a.rule.id.cmp(&b.rule.id))
        });
        Ok(SyncBatch {
            changes,
        })
    }

    fn revision_cursor(&self, owner_id: &OwnerId) -> Result<Option<RevisionCursor>, StatusError> {
        Ok(self.lock()?.cursors.get(owner_id).cloned())
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn create_rule(&self, rule: &RateLimitRule) -> Result<(), StatusError> {
        rule.validate_write_params()?;
        rule.check_field_limits()?;
        let now = self.clock.now();
        let mut state = self.lock()?;
        if state.rules.contains_key(&rule.id) {
            return Err(StatusError::new(
                StatusCode::DuplicateEntry,
                format!("Duplicate entry '{}' for key 'PRIMARY'", rule.id),
            ));
        }
        let stamp = state.next_stamp(now);
        let mut stored = rule.clone();
        stored.valid = true;
        stored.created_at = stamp;
        stored.modified_at = stamp;
        state.upsert_cursor(&stored, stamp);
        state.rules.insert(stored.id.clone(), stored);
        Ok(())
    }

    fn update_rule(&self, rule: &RateLimitRule) -> Result<(), StatusError> {
        rule.validate_write_params()?;
        rule.check_field_limits()?;
        let now = self.clock.now();
        let mut state = self.lock()?;
        if !state
            .rules
            .get(&rule.id)
            .is_some_and(|stored| stored.valid && stored.owner_id == rule.owner_id)
        {
            return Err(no_rows("update", rule));
        }
        let stamp = state.next_stamp(now);
        if let Some(stored) = state.rules.get_mut(&rule.id) {
            stored.labels.clone_from(&rule.labels);
            stored.priority = rule.priority;
            stored.rule.clone_from(&rule.rule);
            stored.revision = rule.revision.clone();
            stored.modified_at = stamp;
        }
        state.upsert_cursor(rule, stamp);
        Ok(())
    }

    fn delete_rule(&self, rule: &RateLimitRule) -> Result<(), StatusError> {
        rule.validate_write_params()?;
        rule.check_field_limits()?;
        let now = self.clock.now();
        let mut state = self.lock()?;
        if !state.rules.get(&rule.id).is_some_and(|stored| stored.owner_id == rule.owner_id) {
            return Err(no_rows("delete", rule));
        }
        let stamp = state.next_stamp(now);
        if let Some(stored) = state.rules.get_mut(&rule.id) {
            stored.valid = false;
            stored.revision = rule.revision.clone();
            stored.modified_at = stamp;
        }
        state.upsert_cursor(rule, stamp);
        Ok(())
    }

    fn reclaim_rule(&self, id: &RuleId) -> Result<bool, StatusError> {
        let mut state = self.lock()?;
        if state.rules.get(id).is_some_and(|rule| !rule.valid) {
            state.rules.remove(id);
            return Ok(true);
        }
        Ok(false)
    }

    fn sweep_tombstones(&self, before: Timestamp, limit: usize) -> Result<usize, StatusError> {
        let mut state = self.lock()?;
        let mut expired: Vec<(Timestamp, RuleId)> = state
            .rules
            .values()
            .filter(|rule| !rule.valid && rule.modified_at < before)
            .map(|rule| (rule.modified_at, rule.id.clone()))
            .collect();
        expired.sort();
        expired.truncate(limit);
        for (_, id) in &expired {
            state.rules.remove(id);
        }
        Ok(expired.len())
    }

    fn get_rule(&self, id: &RuleId) -> Result<Option<RateLimitRule>, StatusError> {
        if id.is_blank() {
            return Err(StatusError::new(StatusCode::EmptyParams, "rule id must not be empty"));
        }
        Ok(self.lock()?.rules.get(id).cloned())
    }

    fn list_rules(
        &self,
        filter: &RuleFilter,
        offset: usize,
        limit: usize,
    ) -> Result<RulePage, StatusError> {
        let state = self.lock()?;
        let mut matched: Vec<&RateLimitRule> =
            state.rules.values().filter(|rule| rule.valid && filter.matches(rule)).collect();
        matched.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then_with(|| a.id.cmp(&b.id)));
        let total = u64::try_from(matched.len()).unwrap_or(u64::MAX);
        let rules = matched.into_iter().skip(offset).take(limit).cloned().collect();
        Ok(RulePage {
            total,
            rules,
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
