// crates/ruleplane-cli/src/i18n.rs
// ============================================================================
// Module: CLI Message Catalog
// Description: Provides the message catalog and formatting for CLI output.
// Purpose: Centralize user-facing strings so wording stays consistent.
// Dependencies: Standard library collections.
// ============================================================================

//! ## Overview
//! The ruleplane CLI keeps user-facing strings in a single catalog. All
//! human-readable output and error text should go through the
//! [`t!`](crate::t) macro; structured results are printed as JSON instead.
//!
//! ## Invariants
//! - The catalog is initialized once and read-only thereafter.
//! - Missing keys fall back to the key itself.
//! - Placeholder substitutions preserve argument order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A formatted message argument captured by the [`macro@crate::t`] macro.
///
/// # Invariants
/// - `key` matches a placeholder name without braces (for example, `path`).
#[derive(Debug, Clone)]
pub struct MessageArg {
    /// The placeholder name used in message templates (e.g., `"path"`).
    pub key: &'static str,
    /// The formatted string value to substitute for this placeholder.
    pub value: String,
}

impl MessageArg {
    /// Constructs a new [`MessageArg`] from a key and displayable value.
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// English message catalog.
const CATALOG: &[(&str, &str)] = &[
    ("main.version", "ruleplane {version}"),
    ("args.key_value_invalid", "Expected KEY=VALUE, got {value}."),
    ("args.timestamp_invalid", "Invalid timestamp {value}: {error}"),
    ("config.load_failed", "Failed to load config: {error}"),
    ("config.validate.ok", "Config is valid."),
    ("logging.init_failed", "Failed to initialize logging: {error}"),
    ("store.open_failed", "Failed to open rule store at {path}: {error}"),
    ("store.operation_failed", "{operation} failed: {error}"),
    ("rule.not_found", "Rule not found: {id}"),
    ("rule.body_read_failed", "Failed to read rule body from {path}: {error}"),
    ("rule.body_too_large", "Rule body in {path} exceeds {limit} bytes."),
    ("filter.invalid", "Invalid list filter: {error}"),
    ("cursor.not_found", "No revision cursor for owner: {owner}"),
    ("plugins.init_failed", "Plugin initialization failed: {error}"),
    ("plugins.record_failed", "Call stats sink {name} failed: {error}"),
    ("sid.parse_failed", "Invalid sid: {error}"),
    ("output.serialize_failed", "Failed to serialize output: {error}"),
    ("output.write_failed", "Failed to write to {stream}: {error}"),
];

/// Returns the message catalog.
fn catalog() -> &'static HashMap<&'static str, &'static str> {
    static CATALOG_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    CATALOG_MAP.get_or_init(|| CATALOG.iter().copied().collect())
}

// ============================================================================
// SECTION: Translation
// ============================================================================

/// Looks up `key` and substitutes `args` into its placeholders.
#[must_use]
pub fn translate(key: &str, args: Vec<MessageArg>) -> String {
    let template = catalog().get(key).copied().unwrap_or(key);
    let mut result = template.to_string();
    for arg in args {
        let placeholder = format!("{{{}}}", arg.key);
        result = result.replace(&placeholder, &arg.value);
    }
    result
}

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Formats a catalog message from a key and named arguments.
///
/// # Arguments
///
/// - `$key` must match a catalog entry.
/// - Named arguments are substituted into `{placeholder}` positions.
#[macro_export]
macro_rules! t {
    ($key:literal $(, $name:ident = $value:expr )* $(,)?) => {{
        let args = ::std::vec![
            $(
                $crate::i18n::MessageArg::new(stringify!($name), $value.to_string()),
            )*
        ];
        $crate::i18n::translate($key, args)
    }};
}

// ============================================================================
// SECTION: Tests
// ============================================================================
