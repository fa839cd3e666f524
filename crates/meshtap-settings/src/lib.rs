//! # meshtap-settings
//!
//! Layered settings for meshtap, lowest priority first:
//! 1. **Compiled defaults**: [`MeshtapSettings::default()`]
//! 2. **Settings file**: `~/.meshtap/settings.json`, deep-merged over defaults
//! 3. **Environment**: `MESHTAP_*` overrides
//!
//! The binary applies command-line flags on top.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, load_with_env,
    settings_path,
};
pub use types::{LoggingSettings, MeshtapSettings, ServerSettings, SourceSettings};
