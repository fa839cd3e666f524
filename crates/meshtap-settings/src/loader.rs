//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`MeshtapSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `MESHTAP_*` environment overrides
//! 4. Validate
//!
//! Command-line flags are applied by the binary after loading.

use std::path::{Path, PathBuf};

use meshtap_core::SourceSpec;
use meshtap_core::source::SourceMode;
use meshtap_logging::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::MeshtapSettings;

/// Bind host.
pub const ENV_HOST: &str = "MESHTAP_HOST";
/// Bind port.
pub const ENV_PORT: &str = "MESHTAP_PORT";
/// Source spec.
pub const ENV_SOURCE: &str = "MESHTAP_SOURCE";
/// Source mode.
pub const ENV_MODE: &str = "MESHTAP_MODE";
/// Log level.
pub const ENV_LOG_LEVEL: &str = "MESHTAP_LOG_LEVEL";
/// Log format.
pub const ENV_LOG_FORMAT: &str = "MESHTAP_LOG_FORMAT";
/// Delivery timeout in milliseconds.
pub const ENV_SEND_TIMEOUT_MS: &str = "MESHTAP_SEND_TIMEOUT_MS";
/// Connection limit.
pub const ENV_MAX_CONNECTIONS: &str = "MESHTAP_MAX_CONNECTIONS";

/// Resolve the default settings file (`~/.meshtap/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".meshtap").join("settings.json")
}

/// Load settings from the default path with env overrides.
pub fn load_settings() -> Result<MeshtapSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env overrides.
///
/// A missing file yields defaults; unreadable or invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<MeshtapSettings> {
    load_with_env(path, |key| std::env::var(key).ok())
}

/// Load settings from `path`, resolving overrides through `lookup`.
pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<MeshtapSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(MeshtapSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: MeshtapSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects merge per key, source wins
/// - Arrays and primitives are replaced by source
/// - `null` in source keeps the target value
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut MeshtapSettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Apply overrides resolved through `lookup`. Empty and invalid values are
/// ignored; invalid ones are logged.
pub fn apply_overrides<F>(settings: &mut MeshtapSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string(ENV_HOST) {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed(ENV_PORT, |s| parse_u16_range(s, 1, u16::MAX)) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed(ENV_SEND_TIMEOUT_MS, |s| parse_u64_range(s, 10, 60_000)) {
        settings.server.send_timeout_ms = v;
    }
    if let Some(v) = env.parsed(ENV_MAX_CONNECTIONS, |s| parse_usize_range(s, 1, 100_000)) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.parsed(ENV_SOURCE, |s| {
        s.parse::<SourceSpec>().ok().map(|_| s.to_owned())
    }) {
        settings.source.spec = v;
    }
    if let Some(v) = env.parsed(ENV_MODE, |s| s.parse::<SourceMode>().ok()) {
        settings.source.mode = v;
    }
    if let Some(v) = env.string(ENV_LOG_LEVEL) {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed(ENV_LOG_FORMAT, |s| s.parse::<LogFormat>().ok()) {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within `min..=max`.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u64` within `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `usize` within `min..=max`.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

// ── Env reader ──────────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T>(&self, key: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = self.string(key)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let merged = deep_merge(
            json!({"server": {"port": 8080, "host": "localhost"}}),
            json!({"server": {"port": 9090}}),
        );
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(json!({"a": 1, "b": 2}), json!({"a": null}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_array_and_primitive_replace() {
        let merged = deep_merge(
            json!({"items": [1, 2, 3], "a": {"nested": true}}),
            json!({"items": [4], "a": 42}),
        );
        assert_eq!(merged, json!({"items": [4], "a": 42}));
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(json!({"a": 1}), json!({"b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    // ── loading ─────────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_with_env(&dir.path().join("nope.json"), no_env).unwrap();
        assert_eq!(settings, MeshtapSettings::default());
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9000}, "source": {"spec": "tcp:radio.local:5000", "mode": "companion"}}"#,
        )
        .unwrap();

        let settings = load_with_env(&path, no_env).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.source.spec, "tcp:radio.local:5000");
        assert_eq!(settings.source.mode, SourceMode::Companion);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_matches!(load_with_env(&path, no_env), Err(SettingsError::Json(_)));
    }

    #[test]
    fn invalid_value_in_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"queue_capacity": 0}}"#).unwrap();
        assert_matches!(
            load_with_env(&path, no_env),
            Err(SettingsError::InvalidValue(_))
        );
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 9000}}"#).unwrap();

        let lookup = env(&[
            (ENV_PORT, "9100"),
            (ENV_HOST, "0.0.0.0"),
            (ENV_MODE, "companion"),
            (ENV_SOURCE, "file:/var/log/frames.txt"),
            (ENV_LOG_LEVEL, "debug"),
            (ENV_LOG_FORMAT, "json"),
            (ENV_SEND_TIMEOUT_MS, "500"),
            (ENV_MAX_CONNECTIONS, "8"),
        ]);
        let settings = load_with_env(&path, lookup).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.send_timeout_ms, 500);
        assert_eq!(settings.server.max_connections, 8);
        assert_eq!(settings.source.mode, SourceMode::Companion);
        assert_eq!(settings.source.spec, "file:/var/log/frames.txt");
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = MeshtapSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                (ENV_PORT, "0"),
                (ENV_SEND_TIMEOUT_MS, "abc"),
                (ENV_MAX_CONNECTIONS, "0"),
                (ENV_MODE, "serial"),
                (ENV_SOURCE, "udp:1.2.3.4:5"),
                (ENV_HOST, "   "),
            ]),
        );
        assert_eq!(settings, MeshtapSettings::default());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u64_range(" 250 ", 10, 60_000), Some(250));
        assert_eq!(parse_u64_range("5", 10, 60_000), None);
        assert_eq!(parse_usize_range("-1", 1, 10), None);
        assert_eq!(parse_usize_range("10", 1, 10), Some(10));
    }
}
