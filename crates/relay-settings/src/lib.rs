//! # relay-settings
//!
//! Configuration for the signal relay, loaded from three layers (in priority
//! order, lowest first):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `~/.signal-relay/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `RELAY_*` overrides
//!
//! The daemon applies CLI flags on top of the result.
//!
//! ```no_run
//! let settings = relay_settings::load_settings().unwrap_or_default();
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
