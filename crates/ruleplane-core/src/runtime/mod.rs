// crates/ruleplane-core/src/runtime/mod.rs
// ============================================================================
// Module: Ruleplane Runtime
// Description: Retry wrapper, in-memory store, rule cache, and plugin registry.
// Purpose: Provide backend-independent runtime pieces built on the interfaces.
// Dependencies: crate::{core, interfaces}, serde_json, tracing
// ============================================================================

//! ## Overview
//! Runtime modules implement behavior that every backend and host shares:
//! the retry-transaction loop, the incremental cache consumer, and explicit
//! plugin initialization. The in-memory store mirrors the relational store's
//! semantics for tests and single-process use.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod cache;
pub mod memory;
pub mod plugins;
pub mod retry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::RefreshReport;
pub use cache::RuleCache;
pub use cache::RuleCacheConfig;
pub use memory::InMemoryRateLimitStore;
pub use plugins::AllowAllLimiter;
pub use plugins::FixedWindowLimiter;
pub use plugins::MemoryCallStats;
pub use plugins::NoopCallStats;
pub use plugins::PluginRegistry;
pub use plugins::PluginSettings;
pub use plugins::Plugins;
pub use retry::RetryPolicy;
pub use retry::retry_transaction;
