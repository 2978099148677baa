// crates/ruleplane-cli/src/lib.rs
// ============================================================================
// Module: Ruleplane CLI Library
// Description: Shared helpers for the ruleplane command-line interface.
// Purpose: Provide reusable components (messages, logging) for the binary and tests.
// Dependencies: tracing-subscriber, ruleplane-config
// ============================================================================

//! ## Overview
//! This library houses the CLI message catalog and the logging installer. The
//! binary entry point (`src/main.rs`) imports these helpers so every
//! user-facing line and every log line is produced the same way.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Message catalog and the [`t!`](crate::t) macro.
pub mod i18n;
/// Tracing subscriber installation.
pub mod logging;
