// crates/ruleplane-store-sqlite/src/rules.rs
// ============================================================================
// Module: SQLite Rule Mutations and Queries
// Description: RateLimitStore implementation over the rule and cursor tables.
// Purpose: Apply rule mutations and their cursor upserts atomically.
// Dependencies: ruleplane-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! Every mutation validates parameters before opening a transaction, then
//! writes the rule row and upserts the owner's revision cursor in the same
//! `IMMEDIATE` transaction. Every write takes its modification time from the
//! store-wide stamp in `store_meta`, bumped in SQL as
//! `MAX(now, high_water_mtime + 1)`. Writers are serialized by the write
//! lock, so stamps strictly increase in commit order and no later commit can
//! land at or below a watermark a reader has already seen. The stamp is never
//! lowered when rows are reclaimed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use ruleplane_core::FilterField;
use ruleplane_core::OwnerId;
use ruleplane_core::RateLimitRule;
use ruleplane_core::RateLimitStore;
use ruleplane_core::Revision;
use ruleplane_core::RuleFilter;
use ruleplane_core::RuleId;
use ruleplane_core::RulePage;
use ruleplane_core::StatusCode;
use ruleplane_core::StatusError;
use ruleplane_core::Timestamp;
use tracing::error;
use tracing::info;

use crate::classify::classify_sqlite_error;
use crate::store::SqliteRateLimitStore;

// ============================================================================
// SECTION: SQL
// ============================================================================

/// Rule columns in [`rule_from_row`] order.
pub(crate) const RULE_COLUMNS: &str =
    "id, owner_id, cluster_id, labels, priority, rule, revision, flag, ctime, mtime";

/// Atomic cursor upsert; the cursor time never moves backwards.
const UPSERT_CURSOR: &str = "INSERT INTO rate_limit_revisions (owner_id, last_revision, mtime)
     VALUES (?1, ?2, ?3)
     ON CONFLICT(owner_id) DO UPDATE SET
         last_revision = excluded.last_revision,
         mtime = MAX(rate_limit_revisions.mtime, excluded.mtime)";

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps a row selected with [`RULE_COLUMNS`] (at offset 0) into a rule.
pub(crate) fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<RateLimitRule> {
    let flag: i64 = row.get(7)?;
    Ok(RateLimitRule {
        id: RuleId::new(row.get::<_, String>(0)?),
        owner_id: OwnerId::new(row.get::<_, String>(1)?),
        cluster_id: row.get::<_, String>(2)?.into(),
        labels: row.get(3)?,
        priority: row.get(4)?,
        rule: row.get(5)?,
        revision: Revision::new(row.get::<_, String>(6)?),
        valid: flag == 0,
        created_at: Timestamp::from_unix_seconds(row.get(8)?),
        modified_at: Timestamp::from_unix_seconds(row.get(9)?),
    })
}

/// Issues the next store-wide modification time inside `tx`.
const NEXT_STAMP: &str = "UPDATE store_meta
     SET high_water_mtime = MAX(?1, high_water_mtime + 1)
     RETURNING high_water_mtime";

/// Bumps and returns the store-wide stamp.
fn next_stamp(tx: &Transaction<'_>, now: i64) -> Result<i64, StatusError> {
    tx.query_row(NEXT_STAMP, params![now], |row| row.get(0))
        .map_err(|err| classify_sqlite_error(&err))
}

/// Upserts the owner's cursor inside `tx`.
fn upsert_cursor(
    tx: &Transaction<'_>,
    rule: &RateLimitRule,
    mtime: i64,
) -> Result<(), StatusError> {
    tx.execute(UPSERT_CURSOR, params![rule.owner_id.as_str(), rule.revision.as_str(), mtime])
        .map_err(|err| classify_sqlite_error(&err))?;
    Ok(())
}

/// Error for mutations that matched nothing.
fn no_rows(op: &str, rule: &RateLimitRule) -> StatusError {
    StatusError::new(
        StatusCode::AffectedRowsMismatch,
        format!("{op} matched no rule with id {} for owner {}", rule.id, rule.owner_id),
    )
}

/// Converts a pagination bound to an SQL integer.
fn sql_bound(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Builds the `WHERE` clause and parameters for a list filter.
fn filter_clause(filter: &RuleFilter) -> (String, Vec<Value>) {
    let mut clause = String::from("flag = 0");
    let mut values = Vec::new();
    for (field, value) in filter.iter() {
        values.push(match field {
            FilterField::Priority => Value::Integer(i64::from(filter.priority().unwrap_or(0))),
            _ => Value::Text(value.to_string()),
        });
        let index = values.len();
        match field {
            FilterField::Labels => clause.push_str(&format!(" AND instr(labels, ?{index}) > 0")),
            _ => clause.push_str(&format!(" AND {} = ?{index}", field.column())),
        }
    }
    (clause, values)
}

// ============================================================================
// SECTION: Store Implementation
// ============================================================================

impl SqliteRateLimitStore {
    /// Logs a failed unit of work on one rule and passes the error through.
    fn log_failure(unit: &str, id: &RuleId, err: StatusError) -> StatusError {
        error!(
            unit,
            rule_id = %id,
            code = %err.code(),
            error = %err,
            "rule store operation failed"
        );
        err
    }

    /// Logs a failed unit of work spanning many rules.
    fn log_unit_failure(unit: &str, err: StatusError) -> StatusError {
        error!(unit, code = %err.code(), error = %err, "rule store operation failed");
        err
    }
}

impl RateLimitStore for SqliteRateLimitStore {
    fn create_rule(&self, rule: &RateLimitRule) -> Result<(), StatusError> {
        rule.validate_write_params()?;
        rule.check_field_limits()?;
        self.write("create_rule", |tx| {
            let stamp = next_stamp(tx, self.now_seconds())?;
            tx.execute(
                &format!(
                    "INSERT INTO rate_limit_rules ({RULE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8)"
                ),
                params![
                    rule.id.as_str(),
                    rule.owner_id.as_str(),
                    rule.cluster_id.as_str(),
                    rule.labels,
                    rule.priority,
                    rule.rule,
                    rule.revision.as_str(),
                    stamp,
                ],
            )
            .map_err(|err| classify_sqlite_error(&err))?;
            upsert_cursor(tx, rule, stamp)
        })
        .map_err(|err| Self::log_failure("create_rule", &rule.id, err))
    }

    fn update_rule(&self, rule: &RateLimitRule) -> Result<(), StatusError> {
        rule.validate_write_params()?;
        rule.check_field_limits()?;
        self.write("update_rule", |tx| {
            let mtime = next_stamp(tx, self.now_seconds())?;
            let changed = tx
                .execute(
                    "UPDATE rate_limit_rules
                     SET labels = ?1, priority = ?2, rule = ?3, revision = ?4, mtime = ?5
                     WHERE id = ?6 AND owner_id = ?7 AND flag = 0",
                    params![
                        rule.labels,
                        rule.priority,
                        rule.rule,
                        rule.revision.as_str(),
                        mtime,
                        rule.id.as_str(),
                        rule.owner_id.as_str(),
                    ],
                )
                .map_err(|err| classify_sqlite_error(&err))?;
            if changed == 0 {
                return Err(no_rows("update", rule));
            }
            upsert_cursor(tx, rule, mtime)
        })
        .map_err(|err| Self::log_failure("update_rule", &rule.id, err))
    }

    fn delete_rule(&self, rule: &RateLimitRule) -> Result<(), StatusError> {
        rule.validate_write_params()?;
        rule.check_field_limits()?;
        self.write("delete_rule", |tx| {
            let mtime = next_stamp(tx, self.now_seconds())?;
            let changed = tx
                .execute(
                    "UPDATE rate_limit_rules SET flag = 1, revision = ?1, mtime = ?2
                     WHERE id = ?3 AND owner_id = ?4",
                    params![
                        rule.revision.as_str(),
                        mtime,
                        rule.id.as_str(),
                        rule.owner_id.as_str(),
                    ],
                )
                .map_err(|err| classify_sqlite_error(&err))?;
            if changed == 0 {
                return Err(no_rows("delete", rule));
            }
            upsert_cursor(tx, rule, mtime)
        })
        .map_err(|err| Self::log_failure("delete_rule", &rule.id, err))
    }

    fn reclaim_rule(&self, id: &RuleId) -> Result<bool, StatusError> {
        let removed = self
            .write("reclaim_rule", |tx| {
                tx.execute(
                    "DELETE FROM rate_limit_rules WHERE id = ?1 AND flag = 1",
                    params![id.as_str()],
                )
                .map_err(|err| classify_sqlite_error(&err))
            })
            .map_err(|err| Self::log_failure("reclaim_rule", id, err))?;
        if removed > 0 {
            info!(rule_id = %id, "tombstone reclaimed");
        }
        Ok(removed > 0)
    }

    fn sweep_tombstones(&self, before: Timestamp, limit: usize) -> Result<usize, StatusError> {
        if limit == 0 {
            return Ok(0);
        }
        let removed = self
            .write("sweep_tombstones", |tx| {
                tx.execute(
                    "DELETE FROM rate_limit_rules
                     WHERE flag = 1 AND id IN (
                         SELECT id FROM rate_limit_rules
                         WHERE flag = 1 AND mtime < ?1
                         ORDER BY mtime ASC, id ASC
                         LIMIT ?2
                     )",
                    params![before.as_unix_seconds(), sql_bound(limit)],
                )
                .map_err(|err| classify_sqlite_error(&err))
            })
            .map_err(|err| Self::log_unit_failure("sweep_tombstones", err))?;
        info!(removed, before = %before, limit, "tombstone sweep finished");
        Ok(removed)
    }

    fn get_rule(&self, id: &RuleId) -> Result<Option<RateLimitRule>, StatusError> {
        if id.is_blank() {
            return Err(StatusError::new(StatusCode::EmptyParams, "rule id must not be empty"));
        }
        self.read("get_rule", |tx| {
            tx.query_row(
                &format!("SELECT {RULE_COLUMNS} FROM rate_limit_rules WHERE id = ?1"),
                params![id.as_str()],
                rule_from_row,
            )
            .optional()
            .map_err(|err| classify_sqlite_error(&err))
        })
    }

    fn list_rules(
        &self,
        filter: &RuleFilter,
        offset: usize,
        limit: usize,
    ) -> Result<RulePage, StatusError> {
        let (clause, values) = filter_clause(filter);
        let count_sql = format!("SELECT COUNT(1) FROM rate_limit_rules WHERE {clause}");
        let page_sql = format!(
            "SELECT {RULE_COLUMNS} FROM rate_limit_rules WHERE {clause}
             ORDER BY mtime DESC, id ASC LIMIT ?{} OFFSET ?{}",
            values.len() + 1,
            values.len() + 2
        );
        self.read("list_rules", |tx| {
            let total: i64 = tx
                .query_row(&count_sql, params_from_iter(values.iter()), |row| row.get(0))
                .map_err(|err| classify_sqlite_error(&err))?;
            let mut page_values = values.clone();
            page_values.push(Value::Integer(sql_bound(limit)));
            page_values.push(Value::Integer(sql_bound(offset)));
            let mut stmt = tx.prepare(&page_sql).map_err(|err| classify_sqlite_error(&err))?;
            let rules = stmt
                .query_map(params_from_iter(page_values.iter()), rule_from_row)
                .map_err(|err| classify_sqlite_error(&err))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| classify_sqlite_error(&err))?;
            Ok(RulePage {
                total: u64::try_from(total).unwrap_or(0),
                rules,
            })
        })
    }
}
