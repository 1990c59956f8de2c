use std::path::Path;

use crate::safety::{is_safe_path, normalize_path};

use super::{types::Settings, ConfigError};

/// Validate settings against the current working directory.
pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    let cwd = std::env::current_dir()
        .map_err(|e| ConfigError::ValidationError(format!("cannot read working directory: {}", e)))?;
    validate_settings_in(settings, &cwd)
}

/// Validate settings. Currently validates:
/// - threads is at least 1
/// - input and output resolve inside `base`
/// - output differs from input
pub fn validate_settings_in(settings: &Settings, base: &Path) -> Result<(), ConfigError> {
    if settings.threads == 0 {
        return Err(ConfigError::ValidationError(
            "threads cannot be 0".to_string(),
        ));
    }

    let input = resolve(base, &settings.input);
    let output = resolve(base, &settings.output);

    for (name, path) in [("input", &input), ("output", &output)] {
        if !is_safe_path(base, path) {
            return Err(ConfigError::ValidationError(format!(
                "{} directory {} is outside {}",
                name,
                path.display(),
                base.display()
            )));
        }
    }

    if normalize_path(&input) == normalize_path(&output) {
        return Err(ConfigError::ValidationError(
            "output directory must differ from input directory".to_string(),
        ));
    }

    Ok(())
}

/// Creates the input and output roots if they are absent.
pub fn ensure_roots(settings: &Settings) -> Result<(), ConfigError> {
    for dir in [&settings.input, &settings.output] {
        std::fs::create_dir_all(dir).map_err(|e| {
            ConfigError::ValidationError(format!("cannot create {}: {}", dir.display(), e))
        })?;
    }
    Ok(())
}

fn resolve(base: &Path, path: &Path) -> std::path::PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings(input: &str, output: &str) -> Settings {
        Settings {
            input: PathBuf::from(input),
            output: PathBuf::from(output),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_valid_settings() {
        assert!(validate_settings_in(&settings("input", "output"), Path::new("/work")).is_ok());
    }

    #[test]
    fn test_validate_threads_zero_fails() {
        let mut s = settings("input", "output");
        s.threads = 0;
        let err = validate_settings_in(&s, Path::new("/work")).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_escaping_root_fails() {
        let base = Path::new("/work");
        assert!(validate_settings_in(&settings("../music", "output"), base).is_err());
        assert!(validate_settings_in(&settings("input", "/tmp/out"), base).is_err());
        assert!(validate_settings_in(&settings("a/../../b", "output"), base).is_err());
    }

    #[test]
    fn test_validate_same_roots_fails() {
        let err = validate_settings_in(&settings("music", "./music"), Path::new("/work")).unwrap_err();
        assert!(err.to_string().contains("differ"));
    }
}
