//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`MoltSettings::default()`]
//! 2. If `~/.molt/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `MOLT_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::MoltSettings;

/// Resolve the path to the settings file (`~/.molt/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".molt").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<MoltSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<MoltSettings> {
    let defaults = serde_json::to_value(MoltSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: MoltSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Integers must parse and fall within the stated range; invalid values are
/// ignored with a warning (file/default value wins).
pub fn apply_env_overrides(settings: &mut MoltSettings) {
    if let Some(v) = read_env_string("MOLT_GATEWAY_URL") {
        settings.gateway.url = v;
    }
    if let Some(v) = read_env_u64("MOLT_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.gateway.connect_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("MOLT_REQUEST_TIMEOUT_MS", 100, 600_000) {
        settings.gateway.request_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("MOLT_RECONNECT_DELAY_MS", 100, 600_000) {
        settings.gateway.reconnect_delay_ms = v;
    }
    if let Some(v) = read_env_string("MOLT_ROLE") {
        settings.role = v;
    }
    if let Some(v) = read_env_string("MOLT_CLIENT_MODE") {
        settings.client.mode = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
