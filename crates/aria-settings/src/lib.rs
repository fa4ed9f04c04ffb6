//! # aria-settings
//!
//! Configuration management with layered sources for the Aria daemon.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`Settings::default()`]
//! 2. **User file** — `~/.aria/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `ARIA_*` overrides (highest priority)
//!
//! The global singleton is set once at daemon startup and read everywhere
//! else; tests inject their own snapshot via [`init_settings`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::{Arc, RwLock};

/// Global settings singleton.
///
/// `RwLock<Option<Arc<Settings>>>` rather than `OnceLock` so tests (and a
/// future `settings.reload`) can swap the cached value. Reads are a shared
/// lock plus an `Arc::clone`.
static SETTINGS: RwLock<Option<Arc<Settings>>> = RwLock::new(None);

/// Get the global settings instance, loading on first access.
///
/// If loading fails, compiled defaults are used (with a warning) so the
/// daemon still comes up.
pub fn get_settings() -> Arc<Settings> {
    {
        let guard = SETTINGS.read().expect("settings lock poisoned");
        if let Some(ref s) = *guard {
            return Arc::clone(s);
        }
    }

    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    // Double-check after acquiring the write lock.
    if let Some(ref s) = *guard {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            Settings::default()
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Replace the global settings with a specific value.
///
/// Used at daemon startup (after CLI overrides are applied) and in tests.
pub fn init_settings(settings: Settings) {
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    *guard = Some(Arc::new(settings));
}
