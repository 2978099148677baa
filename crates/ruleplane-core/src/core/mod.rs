// crates/ruleplane-core/src/core/mod.rs
// ============================================================================
// Module: Ruleplane Core Types
// Description: Canonical rule, cursor, and error taxonomy types.
// Purpose: Provide stable, serializable types shared by stores and readers.
// Dependencies: serde, thiserror, time
// ============================================================================

//! ## Overview
//! Core types define rate-limit rules, revision cursors, sync batches, and the
//! semantic status codes every storage backend reports. These types are the
//! canonical source of truth for any derived surface (CLI, APIs, caches).

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod identifiers;
pub mod rule;
pub mod status;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::ClusterId;
pub use identifiers::OwnerId;
pub use identifiers::Revision;
pub use identifiers::RuleId;
pub use identifiers::Sid;
pub use identifiers::SidParseError;
pub use rule::FilterField;
pub use rule::MAX_BODY_BYTES;
pub use rule::MAX_IDENTIFIER_BYTES;
pub use rule::MAX_REVISION_BYTES;
pub use rule::RateLimitRule;
pub use rule::RevisionCursor;
pub use rule::RuleChange;
pub use rule::RuleFilter;
pub use rule::RulePage;
pub use rule::SyncBatch;
pub use rule::TombstonePolicy;
pub use status::StatusCode;
pub use status::StatusError;
pub use status::classify_error;
pub use status::classify_message;
pub use time::Clock;
pub use time::ManualClock;
pub use time::SystemClock;
pub use time::Timestamp;
pub use time::TimestampParseError;
