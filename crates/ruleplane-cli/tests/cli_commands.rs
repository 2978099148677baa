//! End-to-end command tests for the ruleplane binary.
// crates/ruleplane-cli/tests/cli_commands.rs
// =============================================================================
// Module: CLI Command Tests
// Description: Drive the ruleplane binary against a temporary store.
// Purpose: Ensure commands compose config, store, and plugins correctly.
// =============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use rusqlite::Connection;
use serde_json::Value;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

struct Workspace {
    _dir: TempDir,
    config: PathBuf,
    store: PathBuf,
}

fn workspace(extra: &str) -> Workspace {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("rules.sqlite");
    let config = dir.path().join("ruleplane.toml");
    let contents = format!(
        "[store]\npath = {store:?}\n\n[retry]\nmax_attempts = 3\nretry_delay_ms = 1\n\n\
         [sync]\npoll_interval_ms = 100\n\n[logging]\nfilter = \"warn\"\n{extra}",
        store = store.display().to_string(),
    );
    fs::write(&config, contents).unwrap();
    Workspace {
        _dir: dir,
        config,
        store,
    }
}

fn run(ws: &Workspace, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ruleplane"))
        .arg("--config")
        .arg(&ws.config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn run_json(ws: &Workspace, args: &[&str]) -> Value {
    let output = run(ws, args);
    assert!(
        output.status.success(),
        "command {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn run_failure(ws: &Workspace, args: &[&str]) -> String {
    let output = run(ws, args);
    assert!(!output.status.success(), "command {args:?} unexpectedly succeeded");
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn rule_lifecycle_moves_cursor() {
    let ws = workspace("");
    let created = run_json(&ws, &[
        "rule", "create", "--id", "r1", "--owner", "svcA", "--revision", "v1", "--labels",
        "env=prod", "--body", "{\"max\":10}",
    ]);
    assert_eq!(created["id"], "r1");
    assert_eq!(created["valid"], true);

    run_json(&ws, &["rule", "update", "--id", "r1", "--owner", "svcA", "--revision", "v2"]);
    let cursor = run_json(&ws, &["cursor", "get", "--owner", "svcA"]);
    assert_eq!(cursor["last_revision"], "v2");

    let deleted =
        run_json(&ws, &["rule", "delete", "--id", "r1", "--owner", "svcA", "--revision", "v3"]);
    assert_eq!(deleted["valid"], false);
    let cursor = run_json(&ws, &["cursor", "get", "--owner", "svcA"]);
    assert_eq!(cursor["last_revision"], "v3");

    let page = run_json(&ws, &["rule", "list", "--filter", "owner_id=svcA"]);
    assert_eq!(page["total"], 0);

    let reclaimed = run_json(&ws, &["reclaim", "--id", "r1"]);
    assert_eq!(reclaimed["reclaimed"], true);
    let stderr = run_failure(&ws, &["rule", "get", "--id", "r1"]);
    assert!(stderr.contains("Rule not found: r1"), "{stderr}");
}

#[test]
fn duplicate_create_reports_classified_error() {
    let ws = workspace("");
    run_json(&ws, &["rule", "create", "--id", "r1", "--owner", "svcA", "--revision", "v1"]);
    let stderr =
        run_failure(&ws, &["rule", "create", "--id", "r1", "--owner", "svcA", "--revision", "v1"]);
    assert!(stderr.contains("create_rule failed: duplicate_entry"), "{stderr}");
}

#[test]
fn sync_pull_reports_watermark() {
    let ws = workspace("");
    run_json(&ws, &["rule", "create", "--id", "a", "--owner", "svcA", "--revision", "v1"]);
    let batch = run_json(&ws, &["sync", "pull"]);
    let changes = batch["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["owner_revision"], "v1");
    let watermark = batch["watermark"].as_i64().unwrap().to_string();
    let next = run_json(&ws, &["sync", "pull", "--since", &watermark]);
    assert!(next["changes"].as_array().unwrap().is_empty());
}

#[test]
fn sync_watch_stops_after_iterations() {
    let ws = workspace("");
    run_json(&ws, &["rule", "create", "--id", "a", "--owner", "svcA", "--revision", "v1"]);
    let output = run(&ws, &["sync", "watch", "--iterations", "2"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let lines: Vec<Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["report"]["upserted"], 1);
    assert_eq!(lines[1]["cached_rules"], 1);
}

#[test]
fn sweep_without_tombstones_removes_nothing() {
    let ws = workspace("");
    let swept = run_json(&ws, &["sweep", "--older-than-secs", "0", "--limit", "10"]);
    assert_eq!(swept["removed"], 0);
}

#[test]
fn failed_sweep_is_logged_at_error() {
    let ws = workspace("");
    run_json(&ws, &["rule", "create", "--id", "a", "--owner", "svcA", "--revision", "v1"]);
    let connection = Connection::open(&ws.store).unwrap();
    connection.execute_batch("DROP TABLE rate_limit_rules;").unwrap();
    drop(connection);

    let stderr = run_failure(&ws, &["sweep", "--older-than-secs", "0"]);
    assert!(stderr.contains("rule store operation failed"), "{stderr}");
    assert!(stderr.contains("sweep_tombstones failed"), "{stderr}");
}

#[test]
fn config_commands_share_the_main_dispatch() {
    let ws = workspace("");
    let output = run(&ws, &["config", "validate"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Config is valid."));

    let output = Command::new(env!("CARGO_BIN_EXE_ruleplane"))
        .args(["--config", "missing.toml", "config", "example"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("[store]"));
}

#[test]
fn plugins_check_reports_configured_plugins() {
    let ws = workspace(
        "\n[plugins.rate_limit]\nname = \"fixed-window\"\noptions = { max_requests = 1 }\n",
    );
    let report = run_json(&ws, &["plugins", "check", "--kind", "ip-limit", "--key", "10.0.0.1"]);
    assert_eq!(report["rate_limiter"], "fixed-window");
    assert_eq!(report["call_stats"], "noop");
    assert_eq!(report["probe"]["allowed"], true);
}

#[test]
fn unknown_plugin_fails_initialization() {
    let ws = workspace("\n[plugins.call_stats]\nname = \"statsd\"\n");
    let stderr = run_failure(&ws, &["plugins", "check"]);
    assert!(stderr.contains("Plugin initialization failed"), "{stderr}");
}

#[test]
fn sid_parse_round_trips_without_config() {
    let output = Command::new(env!("CARGO_BIN_EXE_ruleplane"))
        .args(["sid", "parse", "7:42"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let parsed: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["sid"], "7:42");
    assert_eq!(parsed["module_id"], 7);

    let output = Command::new(env!("CARGO_BIN_EXE_ruleplane"))
        .args(["sid", "parse", "a:b"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn invalid_config_fails_closed() {
    let ws = workspace("\n[retry]\n");
    let stderr = run_failure(&ws, &["rule", "get", "--id", "r1"]);
    assert!(stderr.contains("Failed to load config"), "{stderr}");
}
