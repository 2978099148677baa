// crates/ruleplane-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs, tooling, and `ruleplane config example`.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The canonical `ruleplane.toml` example. It sets every section explicitly
//! and must always pass [`crate::RuleplaneConfig::validate`].

/// Returns a canonical example `ruleplane.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[store]
path = "ruleplane.sqlite"
journal_mode = "wal"
sync_mode = "full"
busy_timeout_ms = 5000
pool_size = 4

[retry]
max_attempts = 10
retry_delay_ms = 10

[sync]
overlap_secs = 1
first_pull_tombstones = "include"
poll_interval_ms = 1000
tombstone_retention_secs = 86400
sweep_batch_size = 500

[plugins.rate_limit]
name = "fixed-window"
options = { max_requests = 1000, window_ms = 1000, max_keys = 4096 }

[plugins.call_stats]
name = "memory"

[logging]
filter = "info"
format = "text"
"#,
    )
}
