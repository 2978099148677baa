// crates/ruleplane-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Rule Store
// Description: Durable RateLimitStore backend using SQLite WAL.
// Purpose: Persist versioned rules and revision cursors for incremental sync.
// Dependencies: ruleplane-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`RateLimitStore`] and
//! [`RuleSyncReader`]. Rules are soft-deleted into tombstones, every mutation
//! moves the owner's revision cursor in the same transaction, and driver
//! errors are classified by `SQLite` result code before any message matching.
//!
//! [`RateLimitStore`]: ruleplane_core::RateLimitStore
//! [`RuleSyncReader`]: ruleplane_core::RuleSyncReader

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod classify;
mod rules;
pub mod store;
mod sync;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use classify::classify_sqlite_error;
pub use store::MAX_POOL_SIZE;
pub use store::SCHEMA_VERSION;
pub use store::SqliteRateLimitStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
