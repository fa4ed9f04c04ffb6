//! Settings loading: defaults ← JSON file ← environment.
//!
//! The file layer is deep-merged over serialized defaults so a partial
//! `settings.json` only overrides the keys it names. `ARIA_*` environment
//! variables are applied last.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use crate::errors::{Result, SettingsError};
use crate::types::{Device, Settings, default_cache_dir};

/// Path of the user settings file (`~/.aria/settings.json`).
pub fn settings_path() -> PathBuf {
    default_cache_dir().join("settings.json")
}

/// Load settings from the default path with env overrides.
pub fn load_settings() -> Result<Settings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific file with env overrides.
///
/// A missing file is not an error; defaults (plus env) apply.
pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    let mut merged = serde_json::to_value(Settings::default())
        .map_err(|e| SettingsError::Serialize(e.to_string()))?;

    if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        let file: Value = serde_json::from_str(&raw)
            .map_err(|e| SettingsError::Parse(format!("{}: {e}", path.display())))?;
        deep_merge(&mut merged, file);
    }

    let mut settings: Settings = serde_json::from_value(merged)
        .map_err(|e| SettingsError::Parse(format!("{}: {e}", path.display())))?;

    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursively merge `overlay` into `base`.
///
/// Objects merge key-by-key; any other value (including arrays and null)
/// replaces the base value wholesale.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        let _ = base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

/// `ARIA_*` environment overrides (highest priority).
fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(dir) = std::env::var("ARIA_CACHE_DIR") {
        settings.cache_dir = PathBuf::from(dir);
    }
    if let Ok(tag) = std::env::var("ARIA_DEFAULT_BACKEND") {
        match aria_core::backend::BackendKind::parse(&tag) {
            Some(kind) => settings.default_backend = kind,
            None => warn!(tag, "ignoring unknown ARIA_DEFAULT_BACKEND"),
        }
    }
    if let Ok(limit) = std::env::var("ARIA_QUEUE_LIMIT") {
        match limit.parse::<usize>() {
            Ok(n) if n > 0 => settings.queue_limit = n,
            _ => warn!(limit, "ignoring invalid ARIA_QUEUE_LIMIT"),
        }
    }
    if let Ok(device) = std::env::var("ARIA_DEVICE") {
        match device.as_str() {
            "auto" => settings.device = Device::Auto,
            "cpu" => settings.device = Device::Cpu,
            "cuda" => settings.device = Device::Cuda,
            "metal" => settings.device = Device::Metal,
            other => warn!(device = other, "ignoring unknown ARIA_DEVICE"),
        }
    }
    if let Ok(threads) = std::env::var("ARIA_THREADS") {
        match threads.parse::<usize>() {
            Ok(n) if n > 0 => settings.threads = Some(n),
            _ => warn!(threads, "ignoring invalid ARIA_THREADS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_nested_objects() {
        let mut base = json!({"a": {"x": 1, "y": 2}, "b": 3});
        deep_merge(&mut base, json!({"a": {"y": 9}}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 9}, "b": 3}));
    }

    #[test]
    fn deep_merge_scalar_replaces() {
        let mut base = json!({"a": {"x": 1}});
        deep_merge(&mut base, json!({"a": 5}));
        assert_eq!(base, json!({"a": 5}));
    }

    #[test]
    fn deep_merge_adds_new_keys() {
        let mut base = json!({"a": 1});
        deep_merge(&mut base, json!({"b": {"c": 2}}));
        assert_eq!(base, json!({"a": 1, "b": {"c": 2}}));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let s = load_settings_from_path(Path::new("/nonexistent/aria-settings.json")).unwrap();
        assert_eq!(s.queue_limit, Settings::default().queue_limit);
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), r#"{"cache_max_mb": 512, "ace_step": {"default_steps": 30}}"#)
            .unwrap();
        let s = load_settings_from_path(tmp.path()).unwrap();
        assert_eq!(s.cache_max_mb, 512);
        assert_eq!(s.ace_step.default_steps, 30);
        // untouched siblings keep defaults
        assert!((s.ace_step.default_guidance - 15.0).abs() < f32::EPSILON);
        assert_eq!(s.queue_limit, 8);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "{not json").unwrap();
        assert!(load_settings_from_path(tmp.path()).is_err());
    }
}
