// crates/ruleplane-config/src/lib.rs
// ============================================================================
// Module: Ruleplane Config Library
// Description: Configuration model, loading, and validation.
// Purpose: Single source of truth for ruleplane.toml semantics.
// Dependencies: ruleplane-core, ruleplane-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `ruleplane-config` defines the configuration model for the rule store,
//! retry policy, sync loop, plugin selection, and logging. Loading is strict
//! and fails closed: oversized, non-UTF-8, or inconsistent files are rejected
//! before anything is opened.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
