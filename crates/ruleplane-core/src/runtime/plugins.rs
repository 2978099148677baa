// crates/ruleplane-core/src/runtime/plugins.rs
// ============================================================================
// Module: Plugin Registry
// Description: Named factories and built-in rate-limit and call-stats plugins.
// Purpose: Select policy plugins by configuration name during startup.
// Dependencies: crate::{core, interfaces}, serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Hosts build a [`PluginRegistry`], then call [`PluginRegistry::initialize`]
//! exactly once at startup. Initialization either yields [`Plugins`], a pair
//! of shared handles to pass into consumers, or a [`PluginError`] the host
//! decides how to handle. The registry keeps no process-wide state.
//!
//! Plugin options are a JSON object. Unknown option keys are rejected so a
//! misspelled limit never silently falls back to a default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::info;

use crate::core::Timestamp;
use crate::interfaces::CallStatsSink;
use crate::interfaces::PluginError;
use crate::interfaces::RateLimitKind;
use crate::interfaces::RateLimiter;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Name of the built-in limiter that admits everything.
pub const ALLOW_ALL: &str = "allow-all";
/// Name of the built-in fixed-window limiter.
pub const FIXED_WINDOW: &str = "fixed-window";
/// Name of the built-in sink that discards calls.
pub const NOOP_STATS: &str = "noop";
/// Name of the built-in in-memory counting sink.
pub const MEMORY_STATS: &str = "memory";

/// Plugin selection: a registered name plus its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Registered plugin name.
    pub name: String,
    /// Plugin-specific options.
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl PluginSettings {
    /// Creates settings with no options.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Map::new(),
        }
    }

    /// Adds one option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Rejects option keys outside `allowed`.
    fn expect_keys(&self, allowed: &[&str]) -> Result<(), PluginError> {
        match self.options.keys().find(|key| !allowed.contains(&key.as_str())) {
            Some(key) => Err(self.invalid(format!("unknown option {key:?}"))),
            None => Ok(()),
        }
    }

    /// Reads a positive integer option.
    fn positive_u64(&self, key: &str, default: u64) -> Result<u64, PluginError> {
        let value = match self.options.get(key) {
            None => return Ok(default),
            Some(value) => value
                .as_u64()
                .ok_or_else(|| self.invalid(format!("{key} must be an unsigned integer")))?,
        };
        if value == 0 {
            return Err(self.invalid(format!("{key} must be greater than zero")));
        }
        Ok(value)
    }

    /// Builds an options error for this plugin.
    fn invalid(&self, message: String) -> PluginError {
        PluginError::InvalidOptions {
            name: self.name.clone(),
            message,
        }
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Factory for rate limiters.
pub type RateLimiterFactory =
    Box<dyn Fn(&PluginSettings) -> Result<Arc<dyn RateLimiter>, PluginError> + Send + Sync>;
/// Factory for call-stats sinks.
pub type CallStatsFactory =
    Box<dyn Fn(&PluginSettings) -> Result<Arc<dyn CallStatsSink>, PluginError> + Send + Sync>;

/// Initialized plugin handles.
#[derive(Clone)]
pub struct Plugins {
    /// Selected rate limiter.
    pub rate_limiter: Arc<dyn RateLimiter>,
    /// Selected call-stats sink.
    pub call_stats: Arc<dyn CallStatsSink>,
}

impl fmt::Debug for Plugins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugins")
            .field("rate_limiter", &self.rate_limiter.name())
            .field("call_stats", &self.call_stats.name())
            .finish()
    }
}

/// Name-to-factory registry for policy plugins.
#[derive(Default)]
pub struct PluginRegistry {
    /// Rate limiter factories by name.
    rate_limiters: BTreeMap<String, RateLimiterFactory>,
    /// Call-stats factories by name.
    call_stats: BTreeMap<String, CallStatsFactory>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("rate_limiters", &self.rate_limiters.keys().collect::<Vec<_>>())
            .field("call_stats", &self.call_stats.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in plugins.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_rate_limiter(ALLOW_ALL, |settings| {
            settings.expect_keys(&[])?;
            let limiter: Arc<dyn RateLimiter> = Arc::new(AllowAllLimiter);
            Ok(limiter)
        });
        registry.register_rate_limiter(FIXED_WINDOW, |settings| {
            let limiter: Arc<dyn RateLimiter> =
                Arc::new(FixedWindowLimiter::from_settings(settings)?);
            Ok(limiter)
        });
        registry.register_call_stats(NOOP_STATS, |settings| {
            settings.expect_keys(&[])?;
            let sink: Arc<dyn CallStatsSink> = Arc::new(NoopCallStats);
            Ok(sink)
        });
        registry.register_call_stats(MEMORY_STATS, |settings| {
            settings.expect_keys(&[])?;
            let sink: Arc<dyn CallStatsSink> = Arc::new(MemoryCallStats::new());
            Ok(sink)
        });
        registry
    }

    /// Registers or replaces a rate limiter factory.
    pub fn register_rate_limiter<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&PluginSettings) -> Result<Arc<dyn RateLimiter>, PluginError> + Send + Sync + 'static,
    {
        self.rate_limiters.insert(name.into(), Box::new(factory));
    }

    /// Registers or replaces a call-stats factory.
    pub fn register_call_stats<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&PluginSettings) -> Result<Arc<dyn CallStatsSink>, PluginError>
            + Send
            + Sync
            + 'static,
    {
        self.call_stats.insert(name.into(), Box::new(factory));
    }

    /// Returns registered rate limiter names.
    pub fn rate_limiter_names(&self) -> impl Iterator<Item = &str> {
        self.rate_limiters.keys().map(String::as_str)
    }

    /// Returns registered call-stats names.
    pub fn call_stats_names(&self) -> impl Iterator<Item = &str> {
        self.call_stats.keys().map(String::as_str)
    }

    /// Constructs the selected plugins.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`] for unregistered names and
    /// whatever the factory reports for rejected options.
    pub fn initialize(
        &self,
        rate_limit: &PluginSettings,
        call_stats: &PluginSettings,
    ) -> Result<Plugins, PluginError> {
        let rate_factory =
            self.rate_limiters.get(&rate_limit.name).ok_or_else(|| PluginError::UnknownPlugin {
                kind: "rate_limit",
                name: rate_limit.name.clone(),
            })?;
        let stats_factory =
            self.call_stats.get(&call_stats.name).ok_or_else(|| PluginError::UnknownPlugin {
                kind: "call_stats",
                name: call_stats.name.clone(),
            })?;
        let plugins = Plugins {
            rate_limiter: rate_factory(rate_limit)?,
            call_stats: stats_factory(call_stats)?,
        };
        info!(
            rate_limit = %rate_limit.name,
            call_stats = %call_stats.name,
            "plugins initialized"
        );
        Ok(plugins)
    }
}

// ============================================================================
// SECTION: Built-In Rate Limiters
// ============================================================================

/// Limiter that admits every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllLimiter;

impl RateLimiter for AllowAllLimiter {
    fn name(&self) -> &str {
        ALLOW_ALL
    }

    fn allow(&self, _kind: RateLimitKind, _key: &str) -> bool {
        true
    }
}

/// Counter for one key's current window.
#[derive(Debug, Clone, Copy)]
struct Window {
    /// Window start.
    started: Instant,
    /// Requests admitted in this window.
    count: u64,
}

/// Fixed-window counter per `(kind, key)`.
///
/// # Invariants
/// - At most `max_keys` windows are tracked; when full and nothing has
///   expired, new keys are denied.
/// - A poisoned lock denies.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    /// Requests admitted per window.
    max_requests: u64,
    /// Window length.
    window: Duration,
    /// Tracked key cap.
    max_keys: usize,
    /// Windows by kind and key.
    windows: Mutex<HashMap<(RateLimitKind, String), Window>>,
}

impl FixedWindowLimiter {
    /// Default requests per window.
    pub const DEFAULT_MAX_REQUESTS: u64 = 1000;
    /// Default window length in milliseconds.
    pub const DEFAULT_WINDOW_MS: u64 = 1000;
    /// Default tracked key cap.
    pub const DEFAULT_MAX_KEYS: u64 = 4096;

    /// Creates a limiter.
    #[must_use]
    pub fn new(max_requests: u64, window: Duration, max_keys: usize) -> Self {
        Self {
            max_requests,
            window,
            max_keys,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a limiter from `max_requests`, `window_ms`, and `max_keys`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidOptions`] for unknown keys or
    /// non-positive values.
    pub fn from_settings(settings: &PluginSettings) -> Result<Self, PluginError> {
        settings.expect_keys(&["max_requests", "window_ms", "max_keys"])?;
        let max_requests = settings.positive_u64("max_requests", Self::DEFAULT_MAX_REQUESTS)?;
        let window_ms = settings.positive_u64("window_ms", Self::DEFAULT_WINDOW_MS)?;
        let max_keys = settings.positive_u64("max_keys", Self::DEFAULT_MAX_KEYS)?;
        let max_keys = usize::try_from(max_keys)
            .map_err(|_| settings.invalid("max_keys is too large".to_string()))?;
        Ok(Self::new(max_requests, Duration::from_millis(window_ms), max_keys))
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn name(&self) -> &str {
        FIXED_WINDOW
    }

    fn allow(&self, kind: RateLimitKind, key: &str) -> bool {
        let Ok(mut windows) = self.windows.lock() else {
            return false;
        };
        let now = Instant::now();
        let slot = (kind, key.to_string());
        if !windows.contains_key(&slot) && windows.len() >= self.max_keys {
            windows.retain(|_, window| now.duration_since(window.started) < self.window);
            if windows.len() >= self.max_keys {
                return false;
            }
        }
        let window = windows.entry(slot).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }
        if window.count >= self.max_requests {
            return false;
        }
        window.count += 1;
        true
    }
}

// ============================================================================
// SECTION: Built-In Call Stats
// ============================================================================

/// Sink that discards every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallStats;

impl CallStatsSink for NoopCallStats {
    fn name(&self) -> &str {
        NOOP_STATS
    }

    fn record_call(
        &self,
        _service: &str,
        _namespace: &str,
        _at: Timestamp,
    ) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Per `(service, namespace)` call counters.
#[derive(Debug, Default)]
pub struct MemoryCallStats {
    /// Counts and last call time by service and namespace.
    counts: Mutex<BTreeMap<(String, String), (u64, Timestamp)>>,
}

impl MemoryCallStats {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of calls recorded for a service in a namespace.
    #[must_use]
    pub fn count(&self, service: &str, namespace: &str) -> u64 {
        self.counts.lock().map_or(0, |counts| {
            counts
                .get(&(service.to_string(), namespace.to_string()))
                .map_or(0, |(count, _)| *count)
        })
    }
}

impl CallStatsSink for MemoryCallStats {
    fn name(&self) -> &str {
        MEMORY_STATS
    }

    fn record_call(
        &self,
        service: &str,
        namespace: &str,
        at: Timestamp,
    ) -> Result<(), PluginError> {
        let mut counts = self.counts.lock().map_err(|_| PluginError::Runtime {
            name: MEMORY_STATS.to_string(),
            message: "call stats mutex poisoned".to_string(),
        })?;
        let entry = counts
            .entry((service.to_string(), namespace.to_string()))
            .or_insert((0, Timestamp::UNIX_EPOCH));
        entry.0 = entry.0.saturating_add(1);
        entry.1 = entry.1.max(at);
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
