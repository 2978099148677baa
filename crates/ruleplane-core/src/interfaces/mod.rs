// crates/ruleplane-core/src/interfaces/mod.rs
// ============================================================================
// Module: Ruleplane Interfaces
// Description: Backend-agnostic store, sync reader, and plugin contracts.
// Purpose: Define the seams between stores, cache consumers, and policy plugins.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how Ruleplane integrates with storage backends and
//! pluggable policies without embedding backend-specific details. All store
//! operations are synchronous and report failures as classified
//! [`StatusError`] values; lookups express absence as `None`, never as an
//! error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::OwnerId;
use crate::core::RateLimitRule;
use crate::core::RevisionCursor;
use crate::core::RuleFilter;
use crate::core::RuleId;
use crate::core::RulePage;
use crate::core::StatusError;
use crate::core::SyncBatch;
use crate::core::Timestamp;
use crate::core::TombstonePolicy;

// ============================================================================
// SECTION: Incremental Sync Reader
// ============================================================================

/// Read side used by cache-refresh loops.
pub trait RuleSyncReader {
    /// Returns every rule modified strictly after `watermark`, ordered by
    /// modification time ascending and joined with its owner's cursor.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] when the backend read fails.
    fn pull_since(
        &self,
        watermark: Timestamp,
        tombstones: TombstonePolicy,
    ) -> Result<SyncBatch, StatusError>;

    /// Returns the owner's revision cursor, or `None` for unknown owners.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] when the backend read fails.
    fn revision_cursor(&self, owner_id: &OwnerId) -> Result<Option<RevisionCursor>, StatusError>;
}

// ============================================================================
// SECTION: Versioned Resource Store
// ============================================================================

/// Versioned rule store with per-owner revision cursors.
///
/// # Invariants
/// - Each mutation upserts the owner's cursor in the same atomic unit.
/// - Deletes only tombstone; physical removal requires a prior delete.
pub trait RateLimitStore: RuleSyncReader {
    /// Inserts a new live rule.
    ///
    /// # Errors
    ///
    /// Returns `EmptyParams` for blank parameters and `DuplicateEntry` when
    /// the id already exists, including as a tombstone.
    fn create_rule(&self, rule: &RateLimitRule) -> Result<(), StatusError>;

    /// Replaces the labels, priority, body, and revision of a live rule
    /// owned by `rule.owner_id`.
    ///
    /// # Errors
    ///
    /// Returns `AffectedRowsMismatch` when no live rule matched.
    fn update_rule(&self, rule: &RateLimitRule) -> Result<(), StatusError>;

    /// Tombstones a rule, recording `rule.revision` on the row and cursor.
    ///
    /// # Errors
    ///
    /// Returns `AffectedRowsMismatch` when no rule with that id and owner
    /// exists.
    fn delete_rule(&self, rule: &RateLimitRule) -> Result<(), StatusError>;

    /// Physically removes a tombstone. Returns false when nothing was removed,
    /// including when the rule is still live.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] when the backend write fails.
    fn reclaim_rule(&self, id: &RuleId) -> Result<bool, StatusError>;

    /// Removes up to `limit` tombstones modified before `before`. Returns the
    /// number removed.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] when the backend write fails.
    fn sweep_tombstones(&self, before: Timestamp, limit: usize) -> Result<usize, StatusError>;

    /// Fetches a rule by id, live or tombstoned.
    ///
    /// # Errors
    ///
    /// Returns `EmptyParams` for a blank id.
    fn get_rule(&self, id: &RuleId) -> Result<Option<RateLimitRule>, StatusError>;

    /// Lists live rules matching `filter`, newest modification first.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] when the backend read fails.
    fn list_rules(
        &self,
        filter: &RuleFilter,
        offset: usize,
        limit: usize,
    ) -> Result<RulePage, StatusError>;
}

// ============================================================================
// SECTION: Policy Plugins
// ============================================================================

/// Plugin initialization and runtime errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// No factory is registered under the configured name.
    #[error("unknown {kind} plugin: {name}")]
    UnknownPlugin {
        /// Plugin kind (`rate_limit` or `call_stats`).
        kind: &'static str,
        /// Configured name.
        name: String,
    },
    /// Plugin options were rejected.
    #[error("invalid options for plugin {name}: {message}")]
    InvalidOptions {
        /// Plugin name.
        name: String,
        /// Rejection detail.
        message: String,
    },
    /// Unrecognized rate-limit kind label.
    #[error("unknown rate limit kind: {0}")]
    UnknownKind(String),
    /// A plugin failed at runtime.
    #[error("plugin {name} failed: {message}")]
    Runtime {
        /// Plugin name.
        name: String,
        /// Failure detail.
        message: String,
    },
}

/// Rate-limit dimension checked by a [`RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitKind {
    /// Per client address.
    IpLimit,
    /// Per API.
    ApiLimit,
    /// Per service.
    ServiceLimit,
    /// Per service instance.
    InstanceLimit,
}

impl RateLimitKind {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IpLimit => "ip-limit",
            Self::ApiLimit => "api-limit",
            Self::ServiceLimit => "service-limit",
            Self::InstanceLimit => "instance-limit",
        }
    }
}

impl fmt::Display for RateLimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateLimitKind {
    type Err = PluginError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [Self::IpLimit, Self::ApiLimit, Self::ServiceLimit, Self::InstanceLimit]
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| PluginError::UnknownKind(value.to_string()))
    }
}

/// Rate decision capability.
pub trait RateLimiter: Send + Sync {
    /// Returns the registered plugin name.
    fn name(&self) -> &str;

    /// Returns true when a request identified by `key` may proceed.
    fn allow(&self, kind: RateLimitKind, key: &str) -> bool;
}

/// Call statistics sink.
pub trait CallStatsSink: Send + Sync {
    /// Returns the registered plugin name.
    fn name(&self) -> &str;

    /// Records one call.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Runtime`] when the sink cannot record.
    fn record_call(&self, service: &str, namespace: &str, at: Timestamp)
    -> Result<(), PluginError>;
}
