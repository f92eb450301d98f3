//! Service configuration.
//!
//! Settings live in a TOML file; API credentials come from the environment
//! through [`Secrets`] and are never written back to disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use locus_types::parse_time_of_day;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub tracking: TrackingConfig,
    pub weather: WeatherConfig,
    pub export: ExportConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// ```
    /// use locus_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.tracking.validate());
        errors.extend(self.weather.validate());
        errors.extend(self.export.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the CSV export for a device.
    pub fn export_path(&self, device_id: &str) -> PathBuf {
        self.export
            .directory
            .join(format!("location_export_{device_id}.csv"))
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
            return errors;
        }

        match self.bind.rsplit_once(':') {
            None => errors.push(ValidationError::new(
                "server.bind",
                format!(
                    "invalid bind address '{}': expected format 'host:port'",
                    self.bind
                ),
            )),
            Some((_, port)) => match port.parse::<u16>() {
                Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                Err(_) => errors.push(ValidationError::new(
                    "server.bind",
                    format!("invalid port '{}': must be a number 1-65535", port),
                )),
                Ok(_) => {}
            },
        }

        errors
    }
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: locus_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }
        errors
    }
}

/// Minimum poll interval in seconds.
pub const MIN_POLL_INTERVAL: u64 = 10;
/// Maximum poll interval in seconds (1 hour).
pub const MAX_POLL_INTERVAL: u64 = 3600;

/// Location polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Poll the location API in the background.
    pub enabled: bool,
    /// Seconds between polls.
    pub poll_interval: u64,
    /// Device whose location drives the weather job and the map. Falls back
    /// to `FOLLOWMEE_DEVICE_ID`.
    pub device_id: Option<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: 120,
            device_id: None,
        }
    }
}

impl TrackingConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.poll_interval < MIN_POLL_INTERVAL {
            errors.push(ValidationError::new(
                "tracking.poll_interval",
                format!(
                    "poll interval {} is too short (minimum {} seconds)",
                    self.poll_interval, MIN_POLL_INTERVAL
                ),
            ));
        } else if self.poll_interval > MAX_POLL_INTERVAL {
            errors.push(ValidationError::new(
                "tracking.poll_interval",
                format!(
                    "poll interval {} is too long (maximum {} seconds / 1 hour)",
                    self.poll_interval, MAX_POLL_INTERVAL
                ),
            ));
        }

        if let Some(id) = &self.device_id
            && id.trim().is_empty()
        {
            errors.push(ValidationError::new(
                "tracking.device_id",
                "device id cannot be empty string (use null/omit instead)",
            ));
        }

        errors
    }
}

/// Daily weather notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Send the notification in the background.
    pub enabled: bool,
    /// Local wall-clock time of the daily run, `HH:MM`.
    pub at: String,
    /// Ask the text generator for advice instead of sending the raw forecast.
    pub use_llm: bool,
    /// Text-generation model.
    pub model: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            at: "05:58".to_string(),
            use_llm: true,
            model: locus_core::openai::DEFAULT_MODEL.to_string(),
        }
    }
}

impl WeatherConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if parse_time_of_day(&self.at).is_err() {
            errors.push(ValidationError::new(
                "weather.at",
                format!("invalid time '{}': expected HH:MM", self.at),
            ));
        }
        if self.model.trim().is_empty() {
            errors.push(ValidationError::new("weather.model", "model cannot be empty"));
        }

        errors
    }
}

/// History export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory holding `location_export_{device_id}.csv`.
    pub directory: PathBuf,
    /// Merge new rows into the existing file.
    pub append: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            append: true,
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.directory.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "export.directory",
                "export directory cannot be empty",
            ));
        }
        errors
    }
}

/// API credentials, read from the environment.
///
/// A missing value is only an error once a job needs it.
#[derive(Clone, Default)]
pub struct Secrets {
    pub followmee_api_key: String,
    pub followmee_username: String,
    pub followmee_device_id: Option<String>,
    pub openweathermap_api_key: String,
    pub openai_api_key: String,
    pub pushover_token: String,
    pub pushover_user: String,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let get = |name: &str| lookup(name).unwrap_or_default();
        Self {
            followmee_api_key: get("FOLLOWMEE_API_KEY"),
            followmee_username: get("FOLLOWMEE_USERNAME"),
            followmee_device_id: lookup("FOLLOWMEE_DEVICE_ID").filter(|s| !s.trim().is_empty()),
            openweathermap_api_key: get("OPENWEATHERMAP_API_KEY"),
            openai_api_key: get("OPENAI_API_KEY"),
            pushover_token: get("PUSHOVER_WEATHER_API_TOKEN"),
            pushover_user: get("PUSHOVER_USER_KEY"),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set = |s: &str| if s.is_empty() { "<unset>" } else { "<set>" };
        f.debug_struct("Secrets")
            .field("followmee_api_key", &set(&self.followmee_api_key))
            .field("followmee_username", &self.followmee_username)
            .field("followmee_device_id", &self.followmee_device_id)
            .field("openweathermap_api_key", &set(&self.openweathermap_api_key))
            .field("openai_api_key", &set(&self.openai_api_key))
            .field("pushover_token", &set(&self.pushover_token))
            .field("pushover_user", &set(&self.pushover_user))
            .finish()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `weather.at`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("locus")
        .join("locus.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.storage.path, locus_store::default_db_path());
        assert_eq!(config.tracking.poll_interval, 120);
        assert!(config.tracking.device_id.is_none());
        assert_eq!(config.weather.at, "05:58");
        assert!(config.weather.use_llm);
        assert_eq!(config.weather.model, "gpt-4-turbo");
        assert_eq!(config.export.directory, PathBuf::from("output"));
        assert!(config.export.append);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("locus.toml");

        let mut config = Config::default();
        config.server.bind = "0.0.0.0:9090".to_string();
        config.storage.path = PathBuf::from("/tmp/test.db");
        config.tracking.device_id = Some("12345678".to_string());
        config.weather.at = "06:30".to_string();

        config.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(loaded.server.bind, "0.0.0.0:9090");
        assert_eq!(loaded.storage.path, PathBuf::from("/tmp/test.db"));
        assert_eq!(loaded.tracking.device_id.as_deref(), Some("12345678"));
        assert_eq!(loaded.weather.at, "06:30");
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/locus.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"
            [tracking]
            device_id = "abc"

            [weather]
            use_llm = false
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.tracking.device_id.as_deref(), Some("abc"));
        assert_eq!(config.tracking.poll_interval, 120);
        assert!(!config.weather.use_llm);
        assert_eq!(config.weather.at, "05:58");
        assert_eq!(config.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("locus/locus.toml"));
    }

    #[test]
    fn test_export_path() {
        let config = Config::default();
        assert_eq!(
            config.export_path("42"),
            PathBuf::from("output/location_export_42.csv")
        );
    }

    #[test]
    fn test_server_bind_validation() {
        let mut server = ServerConfig::default();
        assert!(server.validate().is_empty());

        server.bind = "[::1]:8080".to_string();
        assert!(server.validate().is_empty());

        server.bind = "localhost".to_string();
        assert_eq!(server.validate().len(), 1);

        server.bind = "127.0.0.1:0".to_string();
        assert!(server.validate()[0].message.contains("cannot be 0"));

        server.bind = "127.0.0.1:99999".to_string();
        assert!(server.validate()[0].message.contains("invalid port"));
    }

    #[test]
    fn test_tracking_validation() {
        let mut tracking = TrackingConfig {
            poll_interval: 5,
            ..Default::default()
        };
        assert!(tracking.validate()[0].message.contains("too short"));

        tracking.poll_interval = 7200;
        assert!(tracking.validate()[0].message.contains("too long"));

        tracking.poll_interval = 120;
        tracking.device_id = Some(" ".to_string());
        assert_eq!(tracking.validate()[0].field, "tracking.device_id");
    }

    #[test]
    fn test_weather_time_validation() {
        let mut weather = WeatherConfig::default();
        weather.at = "25:00".to_string();
        let errors = weather.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "weather.at");
    }

    #[test]
    fn test_validation_error_display() {
        let mut config = Config::default();
        config.server.bind = String::new();
        config.weather.at = "noon".to_string();

        let err = config.validate().unwrap_err();
        let display = err.to_string();
        assert!(display.contains("server.bind: bind address cannot be empty"));
        assert!(display.contains("weather.at"));
    }

    #[test]
    fn test_secrets_from_lookup() {
        let secrets = Secrets::from_lookup(|name| match name {
            "FOLLOWMEE_API_KEY" => Some("key".to_string()),
            "FOLLOWMEE_DEVICE_ID" => Some("  ".to_string()),
            "PUSHOVER_USER_KEY" => Some("user".to_string()),
            _ => None,
        });
        assert_eq!(secrets.followmee_api_key, "key");
        assert!(secrets.followmee_device_id.is_none());
        assert_eq!(secrets.pushover_user, "user");
        assert!(secrets.openai_api_key.is_empty());

        let debug = format!("{:?}", secrets);
        assert!(!debug.contains("key\""));
        assert!(debug.contains("<set>"));
    }
}
