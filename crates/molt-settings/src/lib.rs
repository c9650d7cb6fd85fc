//! # molt-settings
//!
//! Layered configuration for the Molt gateway client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`MoltSettings::default()`]
//! 2. **User file** — `~/.molt/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `MOLT_*` overrides (highest priority)
//!
//! Connection credentials (token, device token, device id) are NOT settings;
//! they live in the credential store owned by `molt-link`.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton.
static SETTINGS: OnceLock<MoltSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.molt/settings.json` with env var
/// overrides. On subsequent calls, returns the cached value. If loading
/// fails, returns compiled defaults.
pub fn get_settings() -> &'static MoltSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: MoltSettings) -> std::result::Result<(), MoltSettings> {
    SETTINGS.set(settings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
