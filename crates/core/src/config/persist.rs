use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{types::Settings, ConfigError};

/// Settings that are written back to their file when dropped.
///
/// Hold this for the whole run; the file is rewritten on normal exit, early
/// returns and interrupted runs alike.
#[derive(Debug)]
pub struct PersistedSettings {
    settings: Settings,
    path: Option<PathBuf>,
}

impl PersistedSettings {
    /// Wraps `settings`; `None` disables persistence.
    pub fn new(settings: Settings, path: Option<PathBuf>) -> Self {
        Self { settings, path }
    }

    /// Destination file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes the settings now.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(&self.settings)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| ConfigError::WriteError(format!("{}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "Settings saved");
        Ok(())
    }
}

impl Deref for PersistedSettings {
    type Target = Settings;

    fn deref(&self) -> &Settings {
        &self.settings
    }
}

impl Drop for PersistedSettings {
    fn drop(&mut self) {
        if let Err(e) = self.save() {
            warn!(error = %e, "Could not persist settings");
        }
    }
}
