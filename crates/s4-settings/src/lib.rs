//! # s4-settings
//!
//! Configuration for the S4 relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `~/.s4/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables**: `S4_*` overrides (highest priority)
//!
//! CLI flags in the binary are applied on top of the loaded value.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
