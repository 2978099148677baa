// crates/ruleplane-core/src/core/time.rs
// ============================================================================
// Module: Ruleplane Time Model
// Description: Whole-second timestamps and injectable clocks.
// Purpose: Give stores and readers one comparable time unit for watermarks.
// Dependencies: serde, thiserror, time
// ============================================================================

//! ## Overview
//! Rule modification times and sync watermarks are stored and compared at
//! whole-second granularity. Stores never read wall-clock time directly; they
//! ask an injected [`Clock`], so tests can drive time with [`ManualClock`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Unix timestamp in whole seconds.
///
/// # Invariants
/// - Ordering is numeric; watermarks compare with strict `>`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The unix epoch.
    pub const UNIX_EPOCH: Self = Self(0);
    /// Smallest representable timestamp; pulls from here see every row.
    pub const MIN: Self = Self(i64::MIN);

    /// Creates a timestamp from unix seconds.
    #[must_use]
    pub const fn from_unix_seconds(seconds: i64) -> Self {
        Self(seconds)
    }

    /// Returns the timestamp as unix seconds.
    #[must_use]
    pub const fn as_unix_seconds(self) -> i64 {
        self.0
    }

    /// Returns the current wall-clock time truncated to seconds.
    #[must_use]
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Returns this timestamp shifted by `seconds`, saturating at the bounds.
    #[must_use]
    pub const fn saturating_add_seconds(self, seconds: i64) -> Self {
        Self(self.0.saturating_add(seconds))
    }

    /// Returns this timestamp shifted back by `seconds`, saturating at the bounds.
    #[must_use]
    pub const fn saturating_sub_seconds(self, seconds: i64) -> Self {
        Self(self.0.saturating_sub(seconds))
    }

    /// Formats the timestamp as RFC 3339 in UTC, when representable.
    #[must_use]
    pub fn to_rfc3339(self) -> Option<String> {
        OffsetDateTime::from_unix_timestamp(self.0).ok()?.format(&Rfc3339).ok()
    }

    /// Parses unix seconds (`"1700000000"`) or an RFC 3339 date-time.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampParseError`] when the text is neither form.
    pub fn parse(text: &str) -> Result<Self, TimestampParseError> {
        let trimmed = text.trim();
        if let Ok(seconds) = trimmed.parse::<i64>() {
            return Ok(Self(seconds));
        }
        OffsetDateTime::parse(trimmed, &Rfc3339)
            .map(|value| Self(value.unix_timestamp()))
            .map_err(|err| TimestampParseError(format!("{trimmed:?}: {err}")))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Error returned by [`Timestamp::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid timestamp {0}")]
pub struct TimestampParseError(String);

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Source of "now" for stores.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually driven clock for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current unix seconds.
    seconds: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub const fn new(start: Timestamp) -> Self {
        Self {
            seconds: AtomicI64::new(start.as_unix_seconds()),
        }
    }

    /// Moves the clock to `value`.
    pub fn set(&self, value: Timestamp) {
        self.seconds.store(value.as_unix_seconds(), Ordering::SeqCst);
    }

    /// Advances the clock by `seconds`.
    pub fn advance(&self, seconds: i64) {
        self.seconds.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.seconds.load(Ordering::SeqCst))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
