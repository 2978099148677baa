// crates/ruleplane-core/src/runtime/cache.rs
// ============================================================================
// Module: Incremental Rule Cache
// Description: Watermark-driven in-memory view of a rule store.
// Purpose: Keep data-plane caches current without rescanning the full table.
// Dependencies: crate::{core, interfaces}, serde, tracing
// ============================================================================

//! ## Overview
//! [`RuleCache`] polls a [`RuleSyncReader`] with its last watermark and folds
//! the delta into a map of live rules plus each owner's latest revision.
//!
//! Modification times have whole-second resolution, so a write can land in
//! the same second as the newest row of the previous pull. The cache moves its
//! watermark to `max_mtime - overlap_secs` to see such writes, and skips
//! re-delivered rows whose `(modified_at, revision)` it already holds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::core::OwnerId;
use crate::core::RateLimitRule;
use crate::core::Revision;
use crate::core::RuleId;
use crate::core::StatusError;
use crate::core::Timestamp;
use crate::core::TombstonePolicy;
use crate::interfaces::RuleSyncReader;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default watermark overlap in seconds.
pub const DEFAULT_OVERLAP_SECS: u32 = 1;

/// Rule cache tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCacheConfig {
    /// Seconds subtracted from the newest observed mtime when advancing.
    pub overlap_secs: u32,
    /// Tombstone policy for the first pull; later pulls always include them.
    pub first_pull_tombstones: TombstonePolicy,
}

impl Default for RuleCacheConfig {
    fn default() -> Self {
        Self {
            overlap_secs: DEFAULT_OVERLAP_SECS,
            first_pull_tombstones: TombstonePolicy::Include,
        }
    }
}

/// Outcome of one [`RuleCache::refresh`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    /// Rows returned by the reader.
    pub pulled: usize,
    /// Live rules inserted or replaced.
    pub upserted: usize,
    /// Cached rules removed because they were tombstoned.
    pub evicted: usize,
    /// Rows already reflected in the cache.
    pub skipped: usize,
    /// Watermark for the next pull.
    pub watermark: Timestamp,
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// In-memory, incrementally refreshed view of live rules.
#[derive(Debug, Clone)]
pub struct RuleCache {
    /// Tuning.
    config: RuleCacheConfig,
    /// Live rules by id.
    rules: BTreeMap<RuleId, RateLimitRule>,
    /// Latest observed cursor revision per owner.
    owner_revisions: BTreeMap<OwnerId, Revision>,
    /// Exclusive lower bound for the next pull.
    watermark: Timestamp,
    /// True once a pull has completed.
    primed: bool,
}

impl Default for RuleCache {
    fn default() -> Self {
        Self::new(RuleCacheConfig::default())
    }
}

impl RuleCache {
    /// Creates an empty cache that will pull everything on first refresh.
    #[must_use]
    pub const fn new(config: RuleCacheConfig) -> Self {
        Self {
            config,
            rules: BTreeMap::new(),
            owner_revisions: BTreeMap::new(),
            watermark: Timestamp::MIN,
            primed: false,
        }
    }

    /// Pulls changes since the current watermark and applies them.
    ///
    /// # Errors
    ///
    /// Returns the reader's [`StatusError`]; the cache is unchanged on error.
    pub fn refresh<R>(&mut self, reader: &R) -> Result<RefreshReport, StatusError>
    where
        R: RuleSyncReader + ?Sized,
    {
        let policy =
            if self.primed { TombstonePolicy::Include } else { self.config.first_pull_tombstones };
        let batch = reader.pull_since(self.watermark, policy)?;
        let mut report = RefreshReport {
            pulled: batch.len(),
            ..RefreshReport::default()
        };
        if let Some(max) = batch.max_modify_time() {
            let next = max.saturating_sub_seconds(i64::from(self.config.overlap_secs));
            self.watermark = self.watermark.max(next);
        }
        for change in batch.changes {
            self.owner_revisions.insert(change.rule.owner_id.clone(), change.owner_revision);
            let rule = change.rule;
            if !rule.valid {
                if self.rules.remove(&rule.id).is_some() {
                    report.evicted += 1;
                } else {
                    report.skipped += 1;
                }
                continue;
            }
            let unchanged = self.rules.get(&rule.id).is_some_and(|cached| {
                cached.modified_at == rule.modified_at && cached.revision == rule.revision
            });
            if unchanged {
                report.skipped += 1;
            } else {
                self.rules.insert(rule.id.clone(), rule);
                report.upserted += 1;
            }
        }
        self.primed = true;
        report.watermark = self.watermark;
        debug!(
            pulled = report.pulled,
            upserted = report.upserted,
            evicted = report.evicted,
            skipped = report.skipped,
            watermark = %report.watermark,
            "rule cache refreshed"
        );
        Ok(report)
    }

    /// Returns a cached live rule.
    #[must_use]
    pub fn get(&self, id: &RuleId) -> Option<&RateLimitRule> {
        self.rules.get(id)
    }

    /// Returns the latest cursor revision observed for `owner_id`.
    #[must_use]
    pub fn owner_revision(&self, owner_id: &OwnerId) -> Option<&Revision> {
        self.owner_revisions.get(owner_id)
    }

    /// Iterates cached live rules for one owner.
    pub fn rules_for_owner<'a>(
        &'a self,
        owner_id: &'a OwnerId,
    ) -> impl Iterator<Item = &'a RateLimitRule> + 'a {
        self.rules.values().filter(move |rule| &rule.owner_id == owner_id)
    }

    /// Iterates all cached live rules in id order.
    pub fn rules(&self) -> impl Iterator<Item = &RateLimitRule> {
        self.rules.values()
    }

    /// Returns the number of cached live rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true when no live rule is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the watermark the next refresh will use.
    #[must_use]
    pub const fn watermark(&self) -> Timestamp {
        self.watermark
    }
}
