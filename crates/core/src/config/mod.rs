//! Settings for a metronome run.
//!
//! Settings are merged once at startup from built-in defaults, the persisted
//! JSON file, `METRONOME_` environment variables and explicit command-line
//! values, then passed by reference to every component that needs them.

mod loader;
mod persist;
mod types;
mod validate;

pub use loader::{default_settings_path, load_settings, load_settings_from_str};
pub use persist::PersistedSettings;
pub use types::*;
pub use validate::{ensure_roots, validate_settings, validate_settings_in};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse settings: {0}")]
    ParseError(String),

    #[error("Settings validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to write settings: {0}")]
    WriteError(String),
}
