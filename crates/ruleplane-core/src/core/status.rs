// crates/ruleplane-core/src/core/status.rs
// ============================================================================
// Module: Ruleplane Status Taxonomy
// Description: Semantic status codes and the storage error classifier.
// Purpose: Map raw backend failures onto a fixed, inspectable error kind.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every store operation reports failures as a [`StatusError`] carrying a
//! [`StatusCode`]. Callers branch on the code, never on the message text.
//! Backends that expose structured error codes map those first; the phrase
//! table in [`classify_message`] is the fallback for anything else.
//!
//! Classification is idempotent: classifying a [`StatusError`] returns it
//! unchanged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Status Codes
// ============================================================================

/// Semantic error kinds reported by stores.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Only [`StatusCode::Deadlock`] is transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// Operation succeeded.
    Ok,
    /// Missing or invalid parameters.
    EmptyParams,
    /// A value exceeded a column or payload limit.
    OutOfRange,
    /// The identifier already exists.
    DuplicateEntry,
    /// A referenced row does not exist.
    ForeignKeyViolation,
    /// Lock contention or deadlock; safe to retry.
    Deadlock,
    /// A mutation matched no rows.
    AffectedRowsMismatch,
    /// Owner does not exist.
    NotFoundOwner,
    /// Resource does not exist.
    NotFoundResource,
    /// Unrecognized failure.
    Unknown,
}

impl StatusCode {
    /// Returns the stable snake_case label for the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::EmptyParams => "empty_params",
            Self::OutOfRange => "out_of_range",
            Self::DuplicateEntry => "duplicate_entry",
            Self::ForeignKeyViolation => "foreign_key_violation",
            Self::Deadlock => "deadlock",
            Self::AffectedRowsMismatch => "affected_rows_mismatch",
            Self::NotFoundOwner => "not_found_owner",
            Self::NotFoundResource => "not_found_resource",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true when a failed unit of work may be re-run from scratch.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Deadlock)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Status Error
// ============================================================================

/// Classified failure returned by store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct StatusError {
    /// Semantic kind.
    code: StatusCode,
    /// Human-readable detail; never used for control decisions.
    message: String,
}

impl StatusError {
    /// Creates a status error with an explicit code.
    #[must_use]
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a status error by classifying `message` with the phrase table.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code: classify_message(&message),
            message,
        }
    }

    /// Returns the semantic kind.
    #[must_use]
    pub const fn code(&self) -> StatusCode {
        self.code
    }

    /// Returns the detail message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true when the failure is transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Lowercase phrases recognized in driver messages, checked in order.
const PHRASE_TABLE: &[(&str, StatusCode)] = &[
    ("data too long", StatusCode::OutOfRange),
    ("string or blob too big", StatusCode::OutOfRange),
    ("check constraint failed", StatusCode::OutOfRange),
    ("duplicate entry", StatusCode::DuplicateEntry),
    ("unique constraint failed", StatusCode::DuplicateEntry),
    ("foreign key constraint", StatusCode::ForeignKeyViolation),
    ("deadlock", StatusCode::Deadlock),
    ("database is locked", StatusCode::Deadlock),
    ("database table is locked", StatusCode::Deadlock),
];

/// Classifies a raw driver message by case-insensitive phrase match.
///
/// Unmatched messages classify as [`StatusCode::Unknown`].
#[must_use]
pub fn classify_message(message: &str) -> StatusCode {
    let lowered = message.to_ascii_lowercase();
    PHRASE_TABLE
        .iter()
        .find(|(phrase, _)| lowered.contains(phrase))
        .map_or(StatusCode::Unknown, |(_, code)| *code)
}

/// Classifies any error into a [`StatusError`].
///
/// A [`StatusError`] anywhere in the source chain is returned unchanged;
/// otherwise the top-level message is classified with [`classify_message`].
#[must_use]
pub fn classify_error(err: &(dyn Error + 'static)) -> StatusError {
    let mut current = Some(err);
    while let Some(candidate) = current {
        if let Some(status) = candidate.downcast_ref::<StatusError>() {
            return status.clone();
        }
        current = candidate.source();
    }
    StatusError::from_message(err.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
