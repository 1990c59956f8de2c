use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};
use std::path::{Path, PathBuf};

use super::{
    types::{Settings, SettingsOverrides},
    ConfigError,
};

/// File name of the persisted settings in the home directory.
pub const SETTINGS_FILE_NAME: &str = ".metronome.json";

/// `~/.metronome.json`, or `None` when there is no home directory.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(SETTINGS_FILE_NAME))
}

/// Merge defaults, the persisted file, environment and explicit overrides.
///
/// A missing file is treated as empty.
pub fn load_settings(
    path: Option<&Path>,
    overrides: &SettingsOverrides,
) -> Result<Settings, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));

    if let Some(path) = path.filter(|p| p.exists()) {
        figment = figment.merge(Json::file(path));
    }

    let mut settings: Settings = figment
        .merge(Env::prefixed("METRONOME_"))
        .merge(Serialized::defaults(overrides))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    settings.extra_extensions = settings
        .extra_extensions
        .iter()
        .filter_map(|e| crate::scheduler::normalize_extension(e))
        .collect();

    Ok(settings)
}

/// Load settings from a JSON string (useful for testing)
pub fn load_settings_from_str(json: &str) -> Result<Settings, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::OutputFormat;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_settings_from_str_defaults() {
        let settings = load_settings_from_str(r#"{"format":"opus"}"#).unwrap();
        assert_eq!(settings.format, OutputFormat::Opus);
        assert_eq!(settings.input, PathBuf::from("input"));
        assert_eq!(settings.log_level, "warn");
        assert!(settings.threads >= 1);
    }

    #[test]
    fn test_load_settings_from_str_invalid() {
        let err = load_settings_from_str(r#"{"format":"wav"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let settings = load_settings(
            Some(Path::new("/nonexistent/.metronome.json")),
            &SettingsOverrides::default(),
        )
        .unwrap();
        assert_eq!(settings.output, PathBuf::from("output"));
    }

    #[test]
    fn test_persisted_values_fill_in_and_overrides_win() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"input":"music","output":"converted","threads":3,"extra_extensions":[".DSF"]}}"#
        )
        .unwrap();

        let overrides = SettingsOverrides {
            output: Some(PathBuf::from("elsewhere")),
            format: Some(OutputFormat::Opus),
            ..Default::default()
        };
        let settings = load_settings(Some(file.path()), &overrides).unwrap();

        assert_eq!(settings.input, PathBuf::from("music"));
        assert_eq!(settings.output, PathBuf::from("elsewhere"));
        assert_eq!(settings.format, OutputFormat::Opus);
        assert_eq!(settings.threads, 3);
        assert_eq!(settings.extra_extensions, vec!["dsf"]);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{ not json").unwrap();

        let err = load_settings(Some(file.path()), &SettingsOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_overrides_serialize_only_set_fields() {
        let overrides = SettingsOverrides {
            threads: Some(2),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&overrides).unwrap(), r#"{"threads":2}"#);
    }
}
