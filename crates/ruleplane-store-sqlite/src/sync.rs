// crates/ruleplane-store-sqlite/src/sync.rs
// ============================================================================
// Module: SQLite Incremental Sync Reader
// Description: Watermark pulls joined with per-owner revision cursors.
// Purpose: Let cache-refresh loops fetch only rows changed since a watermark.
// Dependencies: ruleplane-core, rusqlite
// ============================================================================

//! ## Overview
//! A pull is one `SELECT` on a pooled connection inside a deferred
//! transaction. Under WAL it reads a consistent snapshot and takes no lock
//! that outlives the query, so writers are never blocked.

use rusqlite::OptionalExtension;
use rusqlite::params;
use ruleplane_core::OwnerId;
use ruleplane_core::Revision;
use ruleplane_core::RevisionCursor;
use ruleplane_core::RuleChange;
use ruleplane_core::RuleSyncReader;
use ruleplane_core::StatusError;
use ruleplane_core::SyncBatch;
use ruleplane_core::Timestamp;
use ruleplane_core::TombstonePolicy;

use crate::classify::classify_sqlite_error;
use crate::rules::rule_from_row;
use crate::store::SqliteRateLimitStore;

/// Strict `>` watermark, ascending mtime, cursor revision at column 10.
const PULL_SINCE: &str = "SELECT r.id, r.owner_id, r.cluster_id, r.labels, r.priority, r.rule,
            r.revision, r.flag, r.ctime, r.mtime, v.last_revision
     FROM rate_limit_rules r
     JOIN rate_limit_revisions v ON v.owner_id = r.owner_id
     WHERE r.mtime > ?1 AND (?2 = 1 OR r.flag = 0)
     ORDER BY r.mtime ASC, r.id ASC";

impl RuleSyncReader for SqliteRateLimitStore {
    fn pull_since(
        &self,
        watermark: Timestamp,
        tombstones: TombstonePolicy,
    ) -> Result<SyncBatch, StatusError> {
        let include = i64::from(tombstones.includes_tombstones());
        self.read("pull_since", |tx| {
            let mut stmt =
                tx.prepare_cached(PULL_SINCE).map_err(|err| classify_sqlite_error(&err))?;
            let changes = stmt
                .query_map(params![watermark.as_unix_seconds(), include], |row| {
                    Ok(RuleChange {
                        rule: rule_from_row(row)?,
                        owner_revision: Revision::new(row.get::<_, String>(10)?),
                    })
                })
                .map_err(|err| classify_sqlite_error(&err))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| classify_sqlite_error(&err))?;
            Ok(SyncBatch {
                changes,
            })
        })
    }

    fn revision_cursor(&self, owner_id: &OwnerId) -> Result<Option<RevisionCursor>, StatusError> {
        self.read("revision_cursor", |tx| {
            tx.query_row(
                "SELECT last_revision, mtime FROM rate_limit_revisions WHERE owner_id = ?1",
                params![owner_id.as_str()],
                |row| {
                    Ok(RevisionCursor {
                        owner_id: owner_id.clone(),
                        last_revision: Revision::new(row.get::<_, String>(0)?),
                        modified_at: Timestamp::from_unix_seconds(row.get(1)?),
                    })
                },
            )
            .optional()
            .map_err(|err| classify_sqlite_error(&err))
        })
    }
}
