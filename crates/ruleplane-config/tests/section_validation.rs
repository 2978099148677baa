//! Section validation tests for ruleplane-config.
// crates/ruleplane-config/tests/section_validation.rs
// =============================================================================
// Module: Config Section Validation Tests
// Description: Validate per-section range checks.
// Purpose: Ensure out-of-range values fail closed instead of being clamped.
// =============================================================================

use std::path::PathBuf;

use ruleplane_config::ConfigError;
use ruleplane_config::RuleplaneConfig;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}

#[test]
fn store_path_must_be_non_empty() -> TestResult {
    let mut config = RuleplaneConfig::default();
    config.store.path = PathBuf::from("  ");
    assert_invalid(config.validate(), "store.path must be non-empty")
}

#[test]
fn store_pool_size_is_bounded() -> TestResult {
    let mut config = RuleplaneConfig::default();
    config.store.pool_size = 0;
    assert_invalid(config.validate(), "store.pool_size")?;
    config.store.pool_size = 65;
    assert_invalid(config.validate(), "store.pool_size")
}

#[test]
fn store_busy_timeout_is_bounded() -> TestResult {
    let mut config = RuleplaneConfig::default();
    config.store.busy_timeout_ms = 60_001;
    assert_invalid(config.validate(), "store.busy_timeout_ms")
}

#[test]
fn retry_attempts_must_be_positive() -> TestResult {
    let mut config = RuleplaneConfig::default();
    config.retry.max_attempts = 0;
    assert_invalid(config.validate(), "retry.max_attempts")?;
    config.retry.max_attempts = 101;
    assert_invalid(config.validate(), "retry.max_attempts")
}

#[test]
fn retry_delay_is_bounded() -> TestResult {
    let mut config = RuleplaneConfig::default();
    config.retry.retry_delay_ms = 10_001;
    assert_invalid(config.validate(), "retry.retry_delay_ms")
}

#[test]
fn sync_bounds_are_enforced() -> TestResult {
    let mut config = RuleplaneConfig::default();
    config.sync.poll_interval_ms = 99;
    assert_invalid(config.validate(), "sync.poll_interval_ms")?;

    let mut config = RuleplaneConfig::default();
    config.sync.overlap_secs = 3_601;
    assert_invalid(config.validate(), "sync.overlap_secs")?;

    let mut config = RuleplaneConfig::default();
    config.sync.tombstone_retention_secs = 0;
    assert_invalid(config.validate(), "sync.tombstone_retention_secs")?;

    let mut config = RuleplaneConfig::default();
    config.sync.sweep_batch_size = 0;
    assert_invalid(config.validate(), "sync.sweep_batch_size")
}

#[test]
fn plugin_names_must_be_set() -> TestResult {
    let mut config = RuleplaneConfig::default();
    config.plugins.rate_limit.name = String::new();
    assert_invalid(config.validate(), "plugins.rate_limit.name")?;

    let mut config = RuleplaneConfig::default();
    config.plugins.call_stats.name = "x".repeat(65);
    assert_invalid(config.validate(), "plugins.call_stats.name exceeds max length")
}

#[test]
fn logging_filter_must_be_set() -> TestResult {
    let mut config = RuleplaneConfig::default();
    config.logging.filter = " ".to_string();
    assert_invalid(config.validate(), "logging.filter must be non-empty")
}

#[test]
fn invalid_values_fail_through_from_toml_str() -> TestResult {
    let result = RuleplaneConfig::from_toml_str("[retry]\nmax_attempts = 0\n").map(|_| ());
    assert_invalid(result, "retry.max_attempts")
}
