// crates/ruleplane-store-sqlite/src/classify.rs
// ============================================================================
// Module: SQLite Error Classification
// Description: Maps rusqlite errors onto semantic status codes.
// Purpose: Classify by SQLite result codes before falling back to phrases.
// Dependencies: ruleplane-core, rusqlite
// ============================================================================

//! ## Overview
//! `SQLite` reports structured result codes, so the classifier looks at the
//! extended code first (which constraint failed) and then the primary code
//! (busy, locked, too big). Only errors without a recognized code fall back to
//! [`StatusError::from_message`].

use std::os::raw::c_int;

use rusqlite::ErrorCode;
use rusqlite::ffi;
use ruleplane_core::StatusCode;
use ruleplane_core::StatusError;

/// Extended result codes with a fixed semantic kind.
const EXTENDED_CODES: &[(c_int, StatusCode)] = &[
    (ffi::SQLITE_CONSTRAINT_PRIMARYKEY, StatusCode::DuplicateEntry),
    (ffi::SQLITE_CONSTRAINT_UNIQUE, StatusCode::DuplicateEntry),
    (ffi::SQLITE_CONSTRAINT_FOREIGNKEY, StatusCode::ForeignKeyViolation),
    (ffi::SQLITE_CONSTRAINT_CHECK, StatusCode::OutOfRange),
    (ffi::SQLITE_CONSTRAINT_NOTNULL, StatusCode::EmptyParams),
];

/// Returns the kind for a structured `SQLite` failure, if recognized.
fn code_kind(failure: &ffi::Error) -> Option<StatusCode> {
    if let Some((_, code)) = EXTENDED_CODES.iter().find(|(ext, _)| *ext == failure.extended_code)
    {
        return Some(*code);
    }
    match failure.code {
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => Some(StatusCode::Deadlock),
        ErrorCode::TooBig => Some(StatusCode::OutOfRange),
        _ => None,
    }
}

/// Classifies a rusqlite error.
#[must_use]
pub fn classify_sqlite_error(err: &rusqlite::Error) -> StatusError {
    if let rusqlite::Error::SqliteFailure(failure, _) = err
        && let Some(code) = code_kind(failure)
    {
        return StatusError::new(code, err.to_string());
    }
    StatusError::from_message(err.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use rusqlite::Connection;
    use ruleplane_core::StatusCode;

    use super::classify_sqlite_error;

    fn failing(sql: &str) -> StatusCode {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute_batch(
                "PRAGMA foreign_keys = ON;
                 CREATE TABLE parent (id TEXT PRIMARY KEY);
                 CREATE TABLE child (
                     id TEXT PRIMARY KEY,
                     parent_id TEXT REFERENCES parent(id),
                     name TEXT NOT NULL UNIQUE,
                     size INTEGER CHECK (size < 10)
                 );
                 INSERT INTO parent (id) VALUES ('p');
                 INSERT INTO child (id, parent_id, name, size) VALUES ('c', 'p', 'n', 1);",
            )
            .unwrap();
        let err = connection.execute_batch(sql).unwrap_err();
        classify_sqlite_error(&err).code()
    }

    #[test]
    fn constraint_codes_map_to_kinds() {
        assert_eq!(
            failing("INSERT INTO child (id, name) VALUES ('c', 'other')"),
            StatusCode::DuplicateEntry
        );
        assert_eq!(
            failing("INSERT INTO child (id, name) VALUES ('d', 'n')"),
            StatusCode::DuplicateEntry
        );
        assert_eq!(
            failing("INSERT INTO child (id, parent_id, name) VALUES ('d', 'missing', 'x')"),
            StatusCode::ForeignKeyViolation
        );
        assert_eq!(
            failing("INSERT INTO child (id, name, size) VALUES ('d', 'x', 99)"),
            StatusCode::OutOfRange
        );
        assert_eq!(failing("INSERT INTO child (id) VALUES ('d')"), StatusCode::EmptyParams);
    }

    #[test]
    fn non_code_errors_fall_back_to_phrases() {
        let err = rusqlite::Error::QueryReturnedNoRows;
        assert_eq!(classify_sqlite_error(&err).code(), StatusCode::Unknown);
        let err = rusqlite::Error::ToSqlConversionFailure("Data too long".into());
        assert_eq!(classify_sqlite_error(&err).code(), StatusCode::OutOfRange);
    }
}
