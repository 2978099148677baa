// crates/ruleplane-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Rule Store
// Description: Connection pool, schema, and transaction plumbing.
// Purpose: Open a durable rule store and run units of work atomically.
// Dependencies: ruleplane-core, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`SqliteRateLimitStore`] owns a fixed set of connections chosen
//! round-robin. Each mutex only serializes use of one non-`Sync` handle;
//! SQLite's transaction isolation is the only data concurrency control.
//! Writes run in `IMMEDIATE` transactions through [`retry_transaction`], so
//! lock contention surfaces as `Deadlock` and is re-run from scratch. Reads run
//! in deferred transactions and, under WAL, never block writers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use ruleplane_core::Clock;
use ruleplane_core::RetryPolicy;
use ruleplane_core::StatusCode;
use ruleplane_core::StatusError;
use ruleplane_core::SystemClock;
use ruleplane_core::retry_transaction;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::classify::classify_sqlite_error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
pub const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default connection pool size.
const DEFAULT_POOL_SIZE: usize = 4;
/// Largest accepted connection pool.
pub const MAX_POOL_SIZE: usize = 64;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode; readers never block writers.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` rule store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `pool_size` is between 1 and [`MAX_POOL_SIZE`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds before contention is reported.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of pooled connections shared by reads and writes.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl SqliteStoreConfig {
    /// Creates a configuration with defaults for everything but the path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Validates limits that do not depend on the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for an out-of-range pool size.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(SqliteStoreError::Invalid(format!(
                "pool_size out of range: {} (1..={MAX_POOL_SIZE})",
                self.pool_size
            )));
        }
        Ok(())
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default connection pool size.
const fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while opening the store. Operations on an open store report
/// [`StatusError`] instead.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store configuration.
    #[error("sqlite store invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed versioned rule store.
///
/// # Invariants
/// - Every mutation and its cursor upsert share one `IMMEDIATE` transaction.
/// - Uncommitted transactions roll back when dropped.
#[derive(Debug, Clone)]
pub struct SqliteRateLimitStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Pooled connections.
    connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for connection selection.
    next_connection: Arc<AtomicUsize>,
    /// Retry budget for contended units of work.
    retry: RetryPolicy,
    /// Time source for ctime/mtime.
    clock: Arc<dyn Clock>,
}

impl SqliteRateLimitStore {
    /// Opens an `SQLite`-backed rule store, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized, or carries an unsupported schema version.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connections = Vec::with_capacity(config.pool_size);
        for _ in 0 .. config.pool_size {
            let mut connection = open_connection(&config)?;
            initialize_schema(&mut connection)?;
            connections.push(Mutex::new(connection));
        }
        debug!(
            path = %config.path.display(),
            pool_size = config.pool_size,
            "sqlite rule store opened"
        );
        Ok(Self {
            config,
            connections: Arc::new(connections),
            next_connection: Arc::new(AtomicUsize::new(0)),
            retry: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the clock used for ctime/mtime.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the current time from the store clock, in unix seconds.
    pub(crate) fn now_seconds(&self) -> i64 {
        self.clock.now().as_unix_seconds()
    }

    /// Locks the next pooled connection.
    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StatusError> {
        let index = self.next_connection.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[index]
            .lock()
            .map_err(|_| StatusError::new(StatusCode::Unknown, "sqlite connection mutex poisoned"))
    }

    /// Runs `work` in an `IMMEDIATE` transaction, retrying contention.
    pub(crate) fn write<T, F>(&self, name: &str, work: F) -> Result<T, StatusError>
    where
        F: Fn(&Transaction<'_>) -> Result<T, StatusError>,
    {
        self.transact(name, TransactionBehavior::Immediate, work)
    }

    /// Runs `work` in a deferred read transaction, retrying contention.
    pub(crate) fn read<T, F>(&self, name: &str, work: F) -> Result<T, StatusError>
    where
        F: Fn(&Transaction<'_>) -> Result<T, StatusError>,
    {
        self.transact(name, TransactionBehavior::Deferred, work)
    }

    /// Runs one unit of work per attempt: begin, work, commit.
    fn transact<T, F>(
        &self,
        name: &str,
        behavior: TransactionBehavior,
        work: F,
    ) -> Result<T, StatusError>
    where
        F: Fn(&Transaction<'_>) -> Result<T, StatusError>,
    {
        retry_transaction(name, &self.retry, |_attempt| {
            let mut connection = self.connection()?;
            let tx = connection
                .transaction_with_behavior(behavior)
                .map_err(|err| classify_sqlite_error(&err))?;
            let value = work(&tx)?;
            tx.commit().map_err(|err| classify_sqlite_error(&err))?;
            Ok(value)
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability and contention handling.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS store_meta (
            version INTEGER NOT NULL,
            high_water_mtime INTEGER NOT NULL DEFAULT 0
        );",
    )
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS rate_limit_rules (
                    id TEXT NOT NULL PRIMARY KEY
                        CHECK (length(CAST(id AS BLOB)) <= 128),
                    owner_id TEXT NOT NULL
                        CHECK (length(CAST(owner_id AS BLOB)) <= 128),
                    cluster_id TEXT NOT NULL DEFAULT ''
                        CHECK (length(CAST(cluster_id AS BLOB)) <= 128),
                    labels TEXT NOT NULL DEFAULT ''
                        CHECK (length(CAST(labels AS BLOB)) <= 65536),
                    priority INTEGER NOT NULL DEFAULT 0
                        CHECK (priority >= 0 AND priority <= 4294967295),
                    rule TEXT NOT NULL DEFAULT ''
                        CHECK (length(CAST(rule AS BLOB)) <= 65536),
                    revision TEXT NOT NULL
                        CHECK (length(CAST(revision AS BLOB)) <= 64),
                    flag INTEGER NOT NULL DEFAULT 0 CHECK (flag IN (0, 1)),
                    ctime INTEGER NOT NULL,
                    mtime INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_rate_limit_rules_mtime
                    ON rate_limit_rules (mtime);
                CREATE INDEX IF NOT EXISTS idx_rate_limit_rules_owner
                    ON rate_limit_rules (owner_id);
                CREATE TABLE IF NOT EXISTS rate_limit_revisions (
                    owner_id TEXT NOT NULL PRIMARY KEY,
                    last_revision TEXT NOT NULL,
                    mtime INTEGER NOT NULL
                );",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
