// crates/ruleplane-core/src/core/rule.rs
// ============================================================================
// Module: Rate-Limit Rule Model
// Description: Rules, revision cursors, sync batches, and list filters.
// Purpose: Provide the shared record types stores persist and readers consume.
// Dependencies: crate::core::{identifiers, status, time}, serde
// ============================================================================

//! ## Overview
//! A [`RateLimitRule`] is a versioned resource scoped to an owner. Every
//! mutation also moves the owner's [`RevisionCursor`]. Deleting a rule only
//! clears its validity flag; the row stays as a tombstone so incremental
//! readers can observe the removal, and is physically reclaimed later.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ClusterId;
use crate::core::identifiers::OwnerId;
use crate::core::identifiers::Revision;
use crate::core::identifiers::RuleId;
use crate::core::status::StatusCode;
use crate::core::status::StatusError;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum bytes for rule, owner, and cluster identifiers.
pub const MAX_IDENTIFIER_BYTES: usize = 128;
/// Maximum bytes for a revision stamp.
pub const MAX_REVISION_BYTES: usize = 64;
/// Maximum bytes for the labels and rule body payloads.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Versioned rate-limit rule.
///
/// # Invariants
/// - `id` never changes after creation.
/// - `modified_at` strictly increases on every mutation, including delete.
/// - `valid == false` marks a tombstone awaiting reclamation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Rule identifier.
    pub id: RuleId,
    /// Owning service.
    pub owner_id: OwnerId,
    /// Target cluster; empty applies everywhere.
    #[serde(default)]
    pub cluster_id: ClusterId,
    /// Serialized label set used for matching.
    #[serde(default)]
    pub labels: String,
    /// Ordering among rules of the same owner.
    #[serde(default)]
    pub priority: u32,
    /// Serialized policy payload.
    #[serde(default)]
    pub rule: String,
    /// Writer-supplied revision stamp.
    pub revision: Revision,
    /// False once soft-deleted.
    #[serde(default = "default_valid")]
    pub valid: bool,
    /// Creation time.
    #[serde(default)]
    pub created_at: Timestamp,
    /// Last modification time.
    #[serde(default)]
    pub modified_at: Timestamp,
}

/// Serde default for [`RateLimitRule::valid`].
const fn default_valid() -> bool {
    true
}

impl RateLimitRule {
    /// Creates a live rule with empty payloads and zero timestamps.
    #[must_use]
    pub fn new(
        id: impl Into<RuleId>,
        owner_id: impl Into<OwnerId>,
        revision: impl Into<Revision>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            cluster_id: ClusterId::default(),
            labels: String::new(),
            priority: 0,
            rule: String::new(),
            revision: revision.into(),
            valid: true,
            created_at: Timestamp::UNIX_EPOCH,
            modified_at: Timestamp::UNIX_EPOCH,
        }
    }

    /// Sets the cluster identifier.
    #[must_use]
    pub fn with_cluster(mut self, cluster_id: impl Into<ClusterId>) -> Self {
        self.cluster_id = cluster_id.into();
        self
    }

    /// Sets the serialized label set.
    #[must_use]
    pub fn with_labels(mut self, labels: impl Into<String>) -> Self {
        self.labels = labels.into();
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the serialized rule body.
    #[must_use]
    pub fn with_body(mut self, rule: impl Into<String>) -> Self {
        self.rule = rule.into();
        self
    }

    /// Sets the revision stamp.
    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<Revision>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Checks the parameters every mutation requires.
    ///
    /// # Errors
    ///
    /// Returns [`StatusCode::EmptyParams`] when the id, owner, or revision is
    /// blank.
    pub fn validate_write_params(&self) -> Result<(), StatusError> {
        let missing = if self.id.is_blank() {
            Some("id")
        } else if self.owner_id.is_blank() {
            Some("owner_id")
        } else if self.revision.is_blank() {
            Some("revision")
        } else {
            None
        };
        match missing {
            Some(field) => Err(StatusError::new(
                StatusCode::EmptyParams,
                format!("rate limit rule {field} must not be empty"),
            )),
            None => Ok(()),
        }
    }

    /// Checks field sizes against the persisted column limits.
    ///
    /// # Errors
    ///
    /// Returns [`StatusCode::OutOfRange`] naming the first oversized field.
    pub fn check_field_limits(&self) -> Result<(), StatusError> {
        let fields: [(&str, usize, usize); 6] = [
            ("id", self.id.as_str().len(), MAX_IDENTIFIER_BYTES),
            ("owner_id", self.owner_id.as_str().len(), MAX_IDENTIFIER_BYTES),
            ("cluster_id", self.cluster_id.as_str().len(), MAX_IDENTIFIER_BYTES),
            ("revision", self.revision.as_str().len(), MAX_REVISION_BYTES),
            ("labels", self.labels.len(), MAX_BODY_BYTES),
            ("rule", self.rule.len(), MAX_BODY_BYTES),
        ];
        for (field, actual, max) in fields {
            if actual > max {
                return Err(StatusError::new(
                    StatusCode::OutOfRange,
                    format!("Data too long for column '{field}' ({actual} > {max} bytes)"),
                ));
            }
        }
        Ok(())
    }
}

/// Latest revision written across all of an owner's rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionCursor {
    /// Owner identifier.
    pub owner_id: OwnerId,
    /// Revision of the owner's most recent mutation.
    pub last_revision: Revision,
    /// Time of that mutation.
    pub modified_at: Timestamp,
}

/// Rule delivered by an incremental pull, joined with its owner's cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleChange {
    /// Rule row, live or tombstoned.
    pub rule: RateLimitRule,
    /// Owner's current cursor revision at read time.
    pub owner_revision: Revision,
}

/// Ordered result of one incremental pull.
///
/// # Invariants
/// - `changes` are ordered by `modified_at` ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBatch {
    /// Changed rules.
    pub changes: Vec<RuleChange>,
}

impl SyncBatch {
    /// Returns the largest modification time in the batch.
    #[must_use]
    pub fn max_modify_time(&self) -> Option<Timestamp> {
        self.changes.iter().map(|change| change.rule.modified_at).max()
    }

    /// Returns true when nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

/// Whether an incremental pull returns tombstoned rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TombstonePolicy {
    /// Return live rules and tombstones.
    #[default]
    Include,
    /// Return live rules only.
    Exclude,
}

impl TombstonePolicy {
    /// Returns true when tombstones are delivered.
    #[must_use]
    pub const fn includes_tombstones(self) -> bool {
        matches!(self, Self::Include)
    }
}

// ============================================================================
// SECTION: List Filters
// ============================================================================

/// Filterable rule columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterField {
    /// Exact match on `id`.
    Id,
    /// Exact match on `owner_id`.
    OwnerId,
    /// Exact match on `cluster_id`.
    ClusterId,
    /// Exact match on `priority`.
    Priority,
    /// Exact match on `revision`.
    Revision,
    /// Substring containment on `labels`.
    Labels,
}

impl FilterField {
    /// Every filterable field.
    pub const ALL: [Self; 6] =
        [Self::Id, Self::OwnerId, Self::ClusterId, Self::Priority, Self::Revision, Self::Labels];

    /// Returns the persisted column name, which is also the filter key.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::OwnerId => "owner_id",
            Self::ClusterId => "cluster_id",
            Self::Priority => "priority",
            Self::Revision => "revision",
            Self::Labels => "labels",
        }
    }

    /// Resolves a filter key against the column whitelist.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.column() == key)
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Validated list filter.
///
/// # Invariants
/// - Keys come from the [`FilterField`] whitelist.
/// - A `priority` value always parses as `u32`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFilter {
    /// Filter values keyed by field.
    values: BTreeMap<FilterField, String>,
}

impl RuleFilter {
    /// Creates an empty filter that matches every live rule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a filter from raw key/value pairs.
    ///
    /// # Errors
    ///
    /// Returns [`StatusCode::EmptyParams`] for unknown keys or a non-integer
    /// priority.
    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self, StatusError>
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut filter = Self::new();
        for (key, value) in pairs {
            let key = key.as_ref();
            let field = FilterField::parse(key).ok_or_else(|| {
                StatusError::new(StatusCode::EmptyParams, format!("unsupported filter key {key:?}"))
            })?;
            filter = filter.with(field, value)?;
        }
        Ok(filter)
    }

    /// Adds or replaces one filter value.
    ///
    /// # Errors
    ///
    /// Returns [`StatusCode::EmptyParams`] when a priority value is not an
    /// unsigned integer.
    pub fn with(
        mut self,
        field: FilterField,
        value: impl Into<String>,
    ) -> Result<Self, StatusError> {
        let value = value.into();
        if field == FilterField::Priority && value.parse::<u32>().is_err() {
            return Err(StatusError::new(
                StatusCode::EmptyParams,
                format!("priority filter must be an unsigned integer, got {value:?}"),
            ));
        }
        self.values.insert(field, value);
        Ok(self)
    }

    /// Returns the filter value for a field.
    #[must_use]
    pub fn get(&self, field: FilterField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    /// Returns the priority filter value.
    #[must_use]
    pub fn priority(&self) -> Option<u32> {
        self.get(FilterField::Priority).and_then(|value| value.parse().ok())
    }

    /// Iterates the filter in field order.
    pub fn iter(&self) -> impl Iterator<Item = (FilterField, &str)> {
        self.values.iter().map(|(field, value)| (*field, value.as_str()))
    }

    /// Returns true when no filter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns true when `rule` matches every filter value. Validity is not
    /// considered here.
    #[must_use]
    pub fn matches(&self, rule: &RateLimitRule) -> bool {
        self.iter().all(|(field, value)| match field {
            FilterField::Id => rule.id.as_str() == value,
            FilterField::OwnerId => rule.owner_id.as_str() == value,
            FilterField::ClusterId => rule.cluster_id.as_str() == value,
            FilterField::Priority => value.parse::<u32>().is_ok_and(|p| p == rule.priority),
            FilterField::Revision => rule.revision.as_str() == value,
            FilterField::Labels => rule.labels.contains(value),
        })
    }
}

/// One page of list results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePage {
    /// Total matching live rules, independent of pagination.
    pub total: u64,
    /// Rules in this page, newest modification first.
    pub rules: Vec<RateLimitRule>,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
