//! Layered settings loader.
//!
//! Layers apply in order, later ones replacing earlier ones:
//! 1. built-in defaults or a preset
//! 2. a TOML or JSON file
//! 3. `PREFIX__SECTION__KEY` environment variables

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::{OptstoreSettings, SettingsError};

/// Builds [`OptstoreSettings`] from defaults, files and the environment.
///
/// # Example
///
/// ```no_run
/// use optstore_config::SettingsLoader;
///
/// # fn main() -> Result<(), optstore_config::SettingsError> {
/// let settings = SettingsLoader::new()
///     .with_defaults()
///     .with_optional_file("optstore.toml")?
///     .with_env_prefix("OPTSTORE")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SettingsLoader {
    settings: OptstoreSettings,
    env_prefix: Option<String>,
    file_loaded: bool,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    /// Create a loader starting from the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: OptstoreSettings::default(),
            env_prefix: None,
            file_loaded: false,
        }
    }

    /// Reset to the default settings.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.settings = OptstoreSettings::default();
        self
    }

    /// Reset to the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.settings = OptstoreSettings::development();
        self
    }

    /// Reset to the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.settings = OptstoreSettings::production();
        self
    }

    /// Load settings from a `.toml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the file is missing, unreadable, has an
    /// unknown extension or does not parse.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SettingsError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| SettingsError::read_error(path, e))?;

        let file_settings = Self::parse_file(&content, path)?;
        self.merge_settings(file_settings);
        self.file_loaded = true;

        Ok(self)
    }

    /// Load settings from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, SettingsError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load settings from a string in the given format (`"toml"` or `"json"`).
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the format is unknown or parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use optstore_config::SettingsLoader;
    ///
    /// let toml = r#"
    ///     [dispatch]
    ///     lock_wakeup_interval_ms = 50
    /// "#;
    ///
    /// let settings = SettingsLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(settings.dispatch.lock_wakeup_interval_ms, 50);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, SettingsError> {
        let parsed = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(SettingsError::validation_error(format!(
                    "unsupported settings format: {format}"
                )))
            }
        };

        self.merge_settings(parsed);
        Ok(self)
    }

    /// Read overrides from environment variables named `PREFIX__SECTION__KEY`,
    /// e.g. `OPTSTORE__DISPATCH__LOCK_WAKEUP_INTERVAL_MS=250`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::ValidationError` if a `.env` file exists but
    /// cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, SettingsError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(SettingsError::validation_error(format!(
                "failed to load .env file: {e}"
            ))),
        }
    }

    /// Whether a settings file has been loaded.
    #[must_use]
    pub fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if an override does not parse or the result
    /// fails [`OptstoreSettings::validate`].
    pub fn load(mut self) -> Result<OptstoreSettings, SettingsError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.settings.validate()?;

        Ok(self.settings)
    }

    /// Return the settings as loaded so far, without environment overrides
    /// or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> OptstoreSettings {
        self.settings
    }

    fn parse_file(content: &str, path: &Path) -> Result<OptstoreSettings, SettingsError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(SettingsError::validation_error(format!(
                "unsupported settings file format: {}",
                path.display()
            ))),
        }
    }

    // Files are complete documents; sections they omit take their defaults.
    fn merge_settings(&mut self, settings: OptstoreSettings) {
        self.settings = settings;
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), SettingsError> {
        let env_vars: HashMap<String, String> =
            env::vars().filter(|(k, _)| k.starts_with(prefix)).collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), SettingsError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            // Another variable sharing the prefix, e.g. OPTSTORE_HOME.
            return Ok(());
        };

        let parts: Vec<&str> = rest.split("__").collect();
        let settings = &mut self.settings;

        match parts.as_slice() {
            ["DISPATCH", "LOCK_WAKEUP_INTERVAL_MS"] => {
                settings.dispatch.lock_wakeup_interval_ms = value
                    .parse()
                    .map_err(|_| SettingsError::env_parse_error(key, "expected integer"))?;
            }

            ["CACHE", "TRACE_CHANGES"] => {
                settings.cache.trace_changes = parse_bool(value)
                    .ok_or_else(|| SettingsError::env_parse_error(key, "expected boolean"))?;
            }

            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                settings.telemetry.logging.enabled = parse_bool(value)
                    .ok_or_else(|| SettingsError::env_parse_error(key, "expected boolean"))?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                settings.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                settings.telemetry.logging.format = value
                    .parse()
                    .map_err(|_| {
                        SettingsError::env_parse_error(key, "expected json, pretty or compact")
                    })?;
            }
            ["TELEMETRY", "LOGGING", "THREAD_IDS"] => {
                settings.telemetry.logging.thread_ids = parse_bool(value)
                    .ok_or_else(|| SettingsError::env_parse_error(key, "expected boolean"))?;
            }
            ["TELEMETRY", "LOGGING", "FILE_LINE_INFO"] => {
                settings.telemetry.logging.file_line_info = parse_bool(value)
                    .ok_or_else(|| SettingsError::env_parse_error(key, "expected boolean"))?;
            }

            ["TELEMETRY", "METRICS", "ENABLED"] => {
                settings.telemetry.metrics.enabled = parse_bool(value)
                    .ok_or_else(|| SettingsError::env_parse_error(key, "expected boolean"))?;
            }

            _ => {}
        }

        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
