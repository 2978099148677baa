// crates/ruleplane-cli/src/main.rs
// ============================================================================
// Module: Ruleplane CLI Entry Point
// Description: Command dispatcher for rule store, sync, and plugin workflows.
// Purpose: Compose config, logging, store, and plugins behind one binary.
// Dependencies: clap, ruleplane-config, ruleplane-core, ruleplane-store-sqlite, serde_json.
// ============================================================================

//! ## Overview
//! The ruleplane CLI is the composition root: it loads `ruleplane.toml`,
//! installs logging, opens the `SQLite` rule store, and initializes plugins
//! before running one subcommand. Results are written to stdout as one JSON
//! document per line; diagnostics go to stderr.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use ruleplane_cli::logging::LOG_ENV_VAR;
use ruleplane_cli::logging::init_logging;
use ruleplane_cli::t;
use ruleplane_config::RuleplaneConfig;
use ruleplane_config::config_toml_example;
use ruleplane_core::MAX_BODY_BYTES;
use ruleplane_core::OwnerId;
use ruleplane_core::PluginRegistry;
use ruleplane_core::RateLimitKind;
use ruleplane_core::RateLimitRule;
use ruleplane_core::RateLimitStore;
use ruleplane_core::RuleCache;
use ruleplane_core::RuleFilter;
use ruleplane_core::RuleId;
use ruleplane_core::RuleSyncReader;
use ruleplane_core::Sid;
use ruleplane_core::StatusError;
use ruleplane_core::Timestamp;
use ruleplane_core::TombstonePolicy;
use ruleplane_store_sqlite::SqliteRateLimitStore;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::info;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default page size for `rule list`.
const DEFAULT_LIST_LIMIT: usize = 100;
/// Maximum page size for `rule list`.
const MAX_LIST_LIMIT: usize = 10_000;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "ruleplane", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Optional config file path (defaults to ruleplane.toml or `RULEPLANE_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Rule mutations and lookups.
    Rule {
        /// Selected rule subcommand.
        #[command(subcommand)]
        command: RuleCommand,
    },
    /// Per-owner revision cursors.
    Cursor {
        /// Selected cursor subcommand.
        #[command(subcommand)]
        command: CursorCommand,
    },
    /// Incremental sync utilities.
    Sync {
        /// Selected sync subcommand.
        #[command(subcommand)]
        command: SyncCommand,
    },
    /// Physically remove one tombstoned rule.
    Reclaim(ReclaimCommand),
    /// Physically remove old tombstones in one batch.
    Sweep(SweepCommand),
    /// Plugin utilities.
    Plugins {
        /// Selected plugins subcommand.
        #[command(subcommand)]
        command: PluginsCommand,
    },
    /// Compact service identifier utilities.
    Sid {
        /// Selected sid subcommand.
        #[command(subcommand)]
        command: SidCommand,
    },
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Rule subcommands.
#[derive(Subcommand, Debug)]
enum RuleCommand {
    /// Create a rule and move the owner's cursor.
    Create(RuleWriteCommand),
    /// Update a live rule and move the owner's cursor.
    Update(RuleWriteCommand),
    /// Tombstone a rule and move the owner's cursor.
    Delete(RuleDeleteCommand),
    /// Fetch a rule by id, including tombstones.
    Get(RuleGetCommand),
    /// List live rules.
    List(RuleListCommand),
}

/// Arguments shared by `rule create` and `rule update`.
#[derive(Args, Debug)]
struct RuleWriteCommand {
    /// Rule identifier.
    #[arg(long, value_name = "ID")]
    id: String,
    /// Owning service.
    #[arg(long, value_name = "OWNER")]
    owner: String,
    /// Revision for this write.
    #[arg(long, value_name = "REVISION")]
    revision: String,
    /// Cluster identifier.
    #[arg(long, value_name = "CLUSTER", default_value = "")]
    cluster: String,
    /// Label text used for substring matching.
    #[arg(long, value_name = "LABELS", default_value = "")]
    labels: String,
    /// Rule priority.
    #[arg(long, value_name = "N", default_value_t = 0)]
    priority: u32,
    /// Inline rule body.
    #[arg(long, value_name = "TEXT", conflicts_with = "body_file")]
    body: Option<String>,
    /// Read the rule body from a file.
    #[arg(long = "body-file", value_name = "PATH")]
    body_file: Option<PathBuf>,
}

/// Arguments for `rule delete`.
#[derive(Args, Debug)]
struct RuleDeleteCommand {
    /// Rule identifier.
    #[arg(long, value_name = "ID")]
    id: String,
    /// Owning service.
    #[arg(long, value_name = "OWNER")]
    owner: String,
    /// Revision recorded on the tombstone.
    #[arg(long, value_name = "REVISION")]
    revision: String,
}

/// Arguments for `rule get`.
#[derive(Args, Debug)]
struct RuleGetCommand {
    /// Rule identifier.
    #[arg(long, value_name = "ID")]
    id: String,
}

/// Arguments for `rule list`.
#[derive(Args, Debug)]
struct RuleListCommand {
    /// Equality filter (`id`, `owner_id`, `cluster_id`, `priority`, `revision`)
    /// or `labels` substring filter.
    #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    filters: Vec<(String, String)>,
    /// Rows to skip.
    #[arg(long, value_name = "N", default_value_t = 0)]
    offset: usize,
    /// Maximum rows to return.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_LIST_LIMIT)]
    limit: usize,
}

/// Cursor subcommands.
#[derive(Subcommand, Debug)]
enum CursorCommand {
    /// Fetch the revision cursor for an owner.
    Get(CursorGetCommand),
}

/// Arguments for `cursor get`.
#[derive(Args, Debug)]
struct CursorGetCommand {
    /// Owning service.
    #[arg(long, value_name = "OWNER")]
    owner: String,
}

/// Sync subcommands.
#[derive(Subcommand, Debug)]
enum SyncCommand {
    /// Pull rules modified after a watermark.
    Pull(SyncPullCommand),
    /// Keep a rule cache converged by polling.
    Watch(SyncWatchCommand),
}

/// Arguments for `sync pull`.
#[derive(Args, Debug)]
struct SyncPullCommand {
    /// Watermark as unix seconds or RFC 3339; rows at exactly this time are skipped.
    #[arg(long, value_name = "TIME", value_parser = parse_timestamp)]
    since: Option<Timestamp>,
    /// Omit tombstoned rules.
    #[arg(long = "exclude-tombstones", action = ArgAction::SetTrue)]
    exclude_tombstones: bool,
}

/// Arguments for `sync watch`.
#[derive(Args, Debug)]
struct SyncWatchCommand {
    /// Stop after this many refreshes (runs until killed when omitted).
    #[arg(long, value_name = "N")]
    iterations: Option<u64>,
}

/// Arguments for `reclaim`.
#[derive(Args, Debug)]
struct ReclaimCommand {
    /// Rule identifier.
    #[arg(long, value_name = "ID")]
    id: String,
}

/// Arguments for `sweep`.
#[derive(Args, Debug)]
struct SweepCommand {
    /// Minimum tombstone age (defaults to `sync.tombstone_retention_secs`).
    #[arg(long = "older-than-secs", value_name = "SECS")]
    older_than_secs: Option<u64>,
    /// Maximum rows removed (defaults to `sync.sweep_batch_size`).
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
}

/// Plugins subcommands.
#[derive(Subcommand, Debug)]
enum PluginsCommand {
    /// Initialize the configured plugins and report them.
    Check(PluginsCheckCommand),
}

/// Arguments for `plugins check`.
#[derive(Args, Debug)]
struct PluginsCheckCommand {
    /// Also ask the rate limiter about this kind (`ip-limit`, `api-limit`, ...).
    #[arg(long, value_name = "KIND", requires = "key")]
    kind: Option<RateLimitKind>,
    /// Key to probe with `--kind`.
    #[arg(long, value_name = "KEY")]
    key: Option<String>,
}

/// Sid subcommands.
#[derive(Subcommand, Debug)]
enum SidCommand {
    /// Parse a `<moduleID>:<commandID>` identifier.
    Parse(SidParseCommand),
}

/// Arguments for `sid parse`.
#[derive(Args, Debug)]
struct SidParseCommand {
    /// Identifier text.
    #[arg(value_name = "SID")]
    value: String,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a ruleplane configuration file.
    Validate,
    /// Print the canonical example configuration.
    Example,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for catalog messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a catalog message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }

    /// Wraps a failed store operation.
    fn store(operation: &str, err: &StatusError) -> Self {
        Self::new(t!("store.operation_failed", operation = operation, error = err))
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&t!("main.version", version = version))?;
        return Ok(ExitCode::SUCCESS);
    }
    let Some(command) = cli.command else {
        write_stdout_line(&t!("main.version", version = env!("CARGO_PKG_VERSION")))?;
        return Ok(ExitCode::SUCCESS);
    };

    let config_path = cli.config.as_deref();
    match command {
        Commands::Sid {
            command,
        } => command_sid(&command),
        Commands::Config {
            command: ConfigCommand::Example,
        } => {
            write_stdout_raw(&config_toml_example())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config {
            command: ConfigCommand::Validate,
        } => {
            load_config(config_path)?;
            write_stdout_line(&t!("config.validate.ok"))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Plugins {
            command,
        } => command_plugins(&load_config(config_path)?, &command),
        Commands::Rule {
            command,
        } => command_rule(&open_store(&load_config(config_path)?)?, command),
        Commands::Cursor {
            command,
        } => command_cursor(&open_store(&load_config(config_path)?)?, &command),
        Commands::Sync {
            command,
        } => {
            let config = load_config(config_path)?;
            command_sync(&config, &open_store(&config)?, &command)
        }
        Commands::Reclaim(command) => {
            command_reclaim(&open_store(&load_config(config_path)?)?, &command)
        }
        Commands::Sweep(command) => {
            let config = load_config(config_path)?;
            command_sweep(&config, &open_store(&config)?, &command)
        }
    }
}

/// Loads and validates the config, then installs logging from it.
fn load_config(path: Option<&Path>) -> CliResult<RuleplaneConfig> {
    let config = RuleplaneConfig::load(path)
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    let env_filter = std::env::var(LOG_ENV_VAR).ok();
    init_logging(&config.logging, env_filter.as_deref())
        .map_err(|err| CliError::new(t!("logging.init_failed", error = err)))?;
    Ok(config)
}

/// Opens the configured store with the configured retry policy.
fn open_store(config: &RuleplaneConfig) -> CliResult<SqliteRateLimitStore> {
    let store = SqliteRateLimitStore::new(config.store.to_sqlite_config()).map_err(|err| {
        CliError::new(t!("store.open_failed", path = config.store.path.display(), error = err))
    })?;
    Ok(store.with_retry_policy(config.retry.to_policy()))
}

// ============================================================================
// SECTION: Rule Commands
// ============================================================================

/// Dispatches rule subcommands.
fn command_rule(store: &SqliteRateLimitStore, command: RuleCommand) -> CliResult<ExitCode> {
    match command {
        RuleCommand::Create(command) => {
            let rule = rule_from_args(command)?;
            store.create_rule(&rule).map_err(|err| CliError::store("create_rule", &err))?;
            write_rule(store, &rule.id)
        }
        RuleCommand::Update(command) => {
            let rule = rule_from_args(command)?;
            store.update_rule(&rule).map_err(|err| CliError::store("update_rule", &err))?;
            write_rule(store, &rule.id)
        }
        RuleCommand::Delete(command) => {
            let rule = RateLimitRule::new(command.id, command.owner, command.revision);
            store.delete_rule(&rule).map_err(|err| CliError::store("delete_rule", &err))?;
            write_rule(store, &rule.id)
        }
        RuleCommand::Get(command) => write_rule(store, &RuleId::new(command.id)),
        RuleCommand::List(command) => {
            let filter = RuleFilter::from_pairs(command.filters)
                .map_err(|err| CliError::new(t!("filter.invalid", error = err)))?;
            let limit = command.limit.min(MAX_LIST_LIMIT);
            let page = store
                .list_rules(&filter, command.offset, limit)
                .map_err(|err| CliError::store("list_rules", &err))?;
            write_json(&page)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Builds a rule from write arguments.
fn rule_from_args(command: RuleWriteCommand) -> CliResult<RateLimitRule> {
    let body = match (command.body, command.body_file) {
        (Some(body), _) => body,
        (None, Some(path)) => read_body_file(&path)?,
        (None, None) => String::new(),
    };
    Ok(RateLimitRule::new(command.id, command.owner, command.revision)
        .with_cluster(command.cluster)
        .with_labels(command.labels)
        .with_priority(command.priority)
        .with_body(body))
}

/// Reads a rule body file with a size limit.
fn read_body_file(path: &Path) -> CliResult<String> {
    let bytes = fs::read(path).map_err(|err| {
        CliError::new(t!("rule.body_read_failed", path = path.display(), error = err))
    })?;
    if bytes.len() > MAX_BODY_BYTES {
        return Err(CliError::new(t!(
            "rule.body_too_large",
            path = path.display(),
            limit = MAX_BODY_BYTES
        )));
    }
    String::from_utf8(bytes).map_err(|err| {
        CliError::new(t!("rule.body_read_failed", path = path.display(), error = err))
    })
}

/// Writes the stored state of a rule, failing when it does not exist.
fn write_rule(store: &SqliteRateLimitStore, id: &RuleId) -> CliResult<ExitCode> {
    let rule = store.get_rule(id).map_err(|err| CliError::store("get_rule", &err))?;
    let Some(rule) = rule else {
        return Err(CliError::new(t!("rule.not_found", id = id)));
    };
    write_json(&rule)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Cursor Commands
// ============================================================================

/// Dispatches cursor subcommands.
fn command_cursor(store: &SqliteRateLimitStore, command: &CursorCommand) -> CliResult<ExitCode> {
    match command {
        CursorCommand::Get(command) => {
            let owner = OwnerId::new(command.owner.clone());
            let cursor = store
                .revision_cursor(&owner)
                .map_err(|err| CliError::store("revision_cursor", &err))?
                .ok_or_else(|| CliError::new(t!("cursor.not_found", owner = owner)))?;
            write_json(&cursor)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ============================================================================
// SECTION: Sync Commands
// ============================================================================

/// Dispatches sync subcommands.
fn command_sync(
    config: &RuleplaneConfig,
    store: &SqliteRateLimitStore,
    command: &SyncCommand,
) -> CliResult<ExitCode> {
    match command {
        SyncCommand::Pull(command) => {
            let policy = if command.exclude_tombstones {
                TombstonePolicy::Exclude
            } else {
                TombstonePolicy::Include
            };
            let since = command.since.unwrap_or(Timestamp::MIN);
            let batch =
                store.pull_since(since, policy).map_err(|err| CliError::store("pull_since", &err))?;
            let watermark = batch.max_modify_time().unwrap_or(since);
            write_json(&json!({
                "watermark": watermark,
                "changes": batch.changes,
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        SyncCommand::Watch(command) => command_sync_watch(config, store, command),
    }
}

/// Polls the store and prints one refresh report per iteration.
fn command_sync_watch(
    config: &RuleplaneConfig,
    store: &SqliteRateLimitStore,
    command: &SyncWatchCommand,
) -> CliResult<ExitCode> {
    let mut cache = RuleCache::new(config.sync.to_cache_config());
    let interval = config.sync.poll_interval();
    let mut completed: u64 = 0;
    loop {
        let report = cache.refresh(store).map_err(|err| CliError::store("refresh", &err))?;
        write_json(&json!({
            "report": report,
            "cached_rules": cache.len(),
        }))?;
        completed = completed.saturating_add(1);
        if command.iterations.is_some_and(|limit| completed >= limit) {
            break;
        }
        thread::sleep(interval);
    }
    info!(refreshes = completed, "sync watch finished");
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Tombstone Commands
// ============================================================================

/// Executes `reclaim`.
fn command_reclaim(store: &SqliteRateLimitStore, command: &ReclaimCommand) -> CliResult<ExitCode> {
    let id = RuleId::new(command.id.clone());
    let reclaimed = store.reclaim_rule(&id).map_err(|err| CliError::store("reclaim_rule", &err))?;
    write_json(&json!({
        "id": id,
        "reclaimed": reclaimed,
    }))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `sweep`.
fn command_sweep(
    config: &RuleplaneConfig,
    store: &SqliteRateLimitStore,
    command: &SweepCommand,
) -> CliResult<ExitCode> {
    let retention = command
        .older_than_secs
        .map_or_else(|| config.sync.retention_seconds(), |secs| {
            i64::try_from(secs).unwrap_or(i64::MAX)
        });
    let limit = command.limit.unwrap_or(config.sync.sweep_batch_size);
    let before = Timestamp::now().saturating_sub_seconds(retention);
    let removed = store
        .sweep_tombstones(before, limit)
        .map_err(|err| CliError::store("sweep_tombstones", &err))?;
    write_json(&json!({
        "before": before,
        "removed": removed,
    }))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Plugin Commands
// ============================================================================

/// Dispatches plugin subcommands.
fn command_plugins(config: &RuleplaneConfig, command: &PluginsCommand) -> CliResult<ExitCode> {
    match command {
        PluginsCommand::Check(command) => {
            let registry = PluginRegistry::with_builtins();
            let plugins = registry
                .initialize(&config.plugins.rate_limit, &config.plugins.call_stats)
                .map_err(|err| CliError::new(t!("plugins.init_failed", error = err)))?;
            let probe = match (command.kind, command.key.as_deref()) {
                (Some(kind), Some(key)) => {
                    let allowed = plugins.rate_limiter.allow(kind, key);
                    plugins
                        .call_stats
                        .record_call("ruleplane-cli", kind.as_str(), Timestamp::now())
                        .map_err(|err| {
                            CliError::new(t!(
                                "plugins.record_failed",
                                name = plugins.call_stats.name(),
                                error = err
                            ))
                        })?;
                    Some(json!({
                        "kind": kind,
                        "key": key,
                        "allowed": allowed,
                    }))
                }
                _ => None,
            };
            write_json(&json!({
                "rate_limiter": plugins.rate_limiter.name(),
                "call_stats": plugins.call_stats.name(),
                "available_rate_limiters": registry.rate_limiter_names().collect::<Vec<_>>(),
                "available_call_stats": registry.call_stats_names().collect::<Vec<_>>(),
                "probe": probe,
            }))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ============================================================================
// SECTION: Sid Commands
// ============================================================================

/// Dispatches sid subcommands.
fn command_sid(command: &SidCommand) -> CliResult<ExitCode> {
    match command {
        SidCommand::Parse(command) => {
            let sid: Sid = command
                .value
                .parse::<Sid>()
                .map_err(|err| CliError::new(t!("sid.parse_failed", error = err)))?;
            write_json(&json!({
                "sid": sid,
                "module_id": sid.module_id,
                "command_id": sid.command_id,
            }))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ============================================================================
// SECTION: Argument Parsers
// ============================================================================

/// Parses a `KEY=VALUE` pair.
fn parse_key_value(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(key, val)| (key.trim().to_string(), val.to_string()))
        .ok_or_else(|| t!("args.key_value_invalid", value = value))
}

/// Parses a unix-seconds or RFC 3339 timestamp.
fn parse_timestamp(value: &str) -> Result<Timestamp, String> {
    Timestamp::parse(value).map_err(|err| t!("args.timestamp_invalid", value = value, error = err))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a value as one JSON line on stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string(value)
        .map_err(|err| CliError::new(t!("output.serialize_failed", error = err)))?;
    write_stdout_line(&text)
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}").map_err(|err| output_error("stdout", &err))
}

/// Writes text to stdout without adding a newline.
fn write_stdout_raw(text: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(text.as_bytes()).map_err(|err| output_error("stdout", &err))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error.
fn output_error(stream: &str, error: &std::io::Error) -> CliError {
    CliError::new(t!("output.write_failed", stream = stream, error = error))
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}

// ============================================================================
// SECTION: Tests
// ============================================================================
