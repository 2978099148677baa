// crates/ruleplane-core/src/runtime/retry.rs
// ============================================================================
// Module: Retry-Transaction Wrapper
// Description: Bounded re-execution of classified transient failures.
// Purpose: Retry contended units of work without duplicating their effects.
// Dependencies: crate::core::status, tracing
// ============================================================================

//! ## Overview
//! [`retry_transaction`] runs a unit of work once per attempt. Each attempt is
//! expected to open its own transaction, do its work, and commit; a failed
//! attempt must leave nothing behind. Only retryable kinds
//! ([`StatusCode::Deadlock`]) are re-run, after a fixed delay. Anything else
//! is returned immediately.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::thread;
use std::time::Duration;

use tracing::error;
use tracing::warn;

use crate::core::StatusCode;
use crate::core::StatusError;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Default attempt budget per unit of work.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Retry budget for one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; zero behaves as one.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
        }
    }

    /// Returns the effective attempt budget.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 { 1 } else { self.max_attempts }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

// ============================================================================
// SECTION: Wrapper
// ============================================================================

/// Runs `work` until it succeeds, fails with a non-retryable kind, or the
/// attempt budget is spent. `work` receives the 1-based attempt number.
///
/// # Errors
///
/// Returns the first non-retryable [`StatusError`], or the last retryable one
/// once `policy` is exhausted.
pub fn retry_transaction<T, F>(
    name: &str,
    policy: &RetryPolicy,
    mut work: F,
) -> Result<T, StatusError>
where
    F: FnMut(u32) -> Result<T, StatusError>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match work(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                warn!(
                    unit = name,
                    attempt,
                    max_attempts = attempts,
                    error = %err,
                    "transaction contended; retrying"
                );
                if !policy.retry_delay.is_zero() {
                    thread::sleep(policy.retry_delay);
                }
                attempt += 1;
            }
            Err(err) => {
                if err.code() == StatusCode::Deadlock {
                    error!(unit = name, attempts, error = %err, "transaction retries exhausted");
                }
                return Err(err);
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use std::time::Duration;

    use super::RetryPolicy;
    use super::retry_transaction;
    use crate::core::StatusCode;
    use crate::core::StatusError;

    const FAST: RetryPolicy = RetryPolicy::new(4, Duration::ZERO);

    #[test]
    fn deadlock_runs_exactly_max_attempts() {
        let mut calls = 0;
        let result: Result<(), _> = retry_transaction("always_locked", &FAST, |_| {
            calls += 1;
            Err(StatusError::new(StatusCode::Deadlock, "database is locked"))
        });
        assert_eq!(result.unwrap_err().code(), StatusCode::Deadlock);
        assert_eq!(calls, 4);
    }

    #[test]
    fn duplicate_entry_runs_once() {
        let mut calls = 0;
        let result: Result<(), _> = retry_transaction("duplicate", &FAST, |_| {
            calls += 1;
            Err(StatusError::new(StatusCode::DuplicateEntry, "UNIQUE constraint failed"))
        });
        assert_eq!(result.unwrap_err().code(), StatusCode::DuplicateEntry);
        assert_eq!(calls, 1);
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let value = retry_transaction("flaky", &FAST, |attempt| {
            if attempt < 3 {
                Err(StatusError::new(StatusCode::Deadlock, "Deadlock found"))
            } else {
                Ok(attempt)
            }
        })
        .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let mut calls = 0;
        let policy = RetryPolicy::new(0, Duration::ZERO);
        let _: Result<(), _> = retry_transaction("zero", &policy, |_| {
            calls += 1;
            Err(StatusError::new(StatusCode::Deadlock, "database is locked"))
        });
        assert_eq!(calls, 1);
    }
}
