// crates/ruleplane-core/src/lib.rs
// ============================================================================
// Module: Ruleplane Core Library
// Description: Public API surface for the Ruleplane core.
// Purpose: Expose the rule model, error taxonomy, retry wrapper, and seams.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Ruleplane core defines versioned rate-limit rules, the per-owner revision
//! cursor, and the storage contract that incremental readers rely on. It is
//! backend-agnostic: relational backends implement [`RateLimitStore`] and
//! consumers such as [`RuleCache`] only depend on the interfaces here.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::CallStatsSink;
pub use interfaces::PluginError;
pub use interfaces::RateLimitKind;
pub use interfaces::RateLimitStore;
pub use interfaces::RateLimiter;
pub use interfaces::RuleSyncReader;
pub use runtime::InMemoryRateLimitStore;
pub use runtime::PluginRegistry;
pub use runtime::PluginSettings;
pub use runtime::Plugins;
pub use runtime::RefreshReport;
pub use runtime::RetryPolicy;
pub use runtime::RuleCache;
pub use runtime::RuleCacheConfig;
pub use runtime::retry_transaction;
