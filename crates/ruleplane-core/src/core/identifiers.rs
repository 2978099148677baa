// crates/ruleplane-core/src/core/identifiers.rs
// ============================================================================
// Module: Ruleplane Identifiers
// Description: Opaque identifiers for rules, owners, clusters, and revisions.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Rule, owner, and cluster identifiers are opaque strings that serialize
//! transparently. [`Revision`] is an equality-only version stamp: two
//! revisions are either the same or different, and nothing here orders them.
//! [`Sid`] is the compact `"<moduleID>:<commandID>"` service identifier.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Unique, immutable identifier of a rate-limit rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    /// Creates a new rule identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the identifier is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RuleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RuleId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Owner identifier (the governed service) shared by a set of rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates a new owner identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the identifier is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Cluster identifier a rule applies to. Empty means "all clusters".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(String);

impl ClusterId {
    /// Creates a new cluster identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ClusterId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClusterId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Opaque writer-supplied revision stamp.
///
/// # Invariants
/// - Only equality is meaningful; revisions carry no ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Creates a new revision stamp.
    #[must_use]
    pub fn new(revision: impl Into<String>) -> Self {
        Self(revision.into())
    }

    /// Returns the revision as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the revision is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Revision {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Revision {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Compact Service Identifier
// ============================================================================

/// Errors returned when parsing a [`Sid`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SidParseError {
    /// Input did not contain exactly two `:`-separated fields.
    #[error("invalid sid format: expected <moduleID>:<commandID>, got {0:?}")]
    Format(String),
    /// A field was not an unsigned 32-bit integer.
    #[error("invalid sid field {field}: {value:?}")]
    Field {
        /// Field name (`module_id` or `command_id`).
        field: &'static str,
        /// Raw field text.
        value: String,
    },
}

/// Compact service identifier serialized as `"<moduleID>:<commandID>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid {
    /// Module identifier.
    pub module_id: u32,
    /// Command identifier.
    pub command_id: u32,
}

impl Sid {
    /// Creates a new compact identifier.
    #[must_use]
    pub const fn new(module_id: u32, command_id: u32) -> Self {
        Self {
            module_id,
            command_id,
        }
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module_id, self.command_id)
    }
}

impl FromStr for Sid {
    type Err = SidParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut fields = value.split(':');
        let (Some(module), Some(command), None) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(SidParseError::Format(value.to_string()));
        };
        Ok(Self {
            module_id: parse_field("module_id", module)?,
            command_id: parse_field("command_id", command)?,
        })
    }
}

impl Serialize for Sid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses one decimal `u32` sid field.
fn parse_field(field: &'static str, value: &str) -> Result<u32, SidParseError> {
    // `u32::from_str` accepts a leading '+', which would not round-trip.
    if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(SidParseError::Field {
            field,
            value: value.to_string(),
        });
    }
    value.parse().map_err(|_| SidParseError::Field {
        field,
        value: value.to_string(),
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::Sid;
    use super::SidParseError;

    #[test]
    fn sid_round_trips_through_display() {
        let sid: Sid = "7:42".parse().unwrap();
        assert_eq!(sid, Sid::new(7, 42));
        assert_eq!(sid.to_string(), "7:42");
    }

    #[test]
    fn sid_rejects_wrong_field_count() {
        assert!(matches!("7".parse::<Sid>(), Err(SidParseError::Format(_))));
        assert!(matches!("1:2:3".parse::<Sid>(), Err(SidParseError::Format(_))));
    }

    #[test]
    fn sid_rejects_non_numeric_fields() {
        assert!(matches!(
            "a:b".parse::<Sid>(),
            Err(SidParseError::Field {
                field: "module_id",
                ..
            })
        ));
        assert!(matches!(
            "7:+4".parse::<Sid>(),
            Err(SidParseError::Field {
                field: "command_id",
                ..
            })
        ));
        assert!("4294967296:1".parse::<Sid>().is_err());
    }
}
