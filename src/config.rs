//! Application configuration using Figment.
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (every field has one)
//! 2. `config/field_logger.toml`, or the file given with `--config`
//! 3. Environment variables prefixed with `FIELD_LOGGER_`, nested keys split
//!    on a double underscore
//!
//! # Example
//! ```no_run
//! use field_logger::config::AppConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // FIELD_LOGGER_SERIAL__PORT=/dev/ttyS1 overrides [serial] port
//! let config = AppConfig::load()?;
//! println!("Logging into {}", config.storage.root_dir.display());
//! # Ok(())
//! # }
//! ```

use crate::error::ConfigError;
use crate::logging::{parse_log_level, OutputFormat, TracingConfig};
use crate::remote::RemoteNaming;
use crate::transport::SerialSettings;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/field_logger.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "FIELD_LOGGER_";

/// Upper bound on `remote.token_ttl_secs` (ten years).
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sensor link
    pub serial: SerialConfig,
    /// Local CSV output
    pub storage: StorageConfig,
    /// Calibration resource
    pub calibration: CalibrationConfig,
    /// Remote folder store
    pub remote: RemoteConfig,
    /// Log output
    pub logging: LoggingConfig,
}

/// Serial line and Modbus addressing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Line speed
    pub baud_rate: u32,
    /// Bound on one complete request/response exchange
    pub timeout_ms: u64,
    /// Modbus unit (slave) id
    pub unit_id: u8,
    /// First register of the channel block
    pub start_register: u16,
}

impl Default for SerialConfig {
    fn default() -> Self {
        let settings = SerialSettings::default();
        Self {
            port: settings.port,
            baud_rate: settings.baud_rate,
            timeout_ms: settings.timeout.as_millis() as u64,
            unit_id: settings.unit_id,
            start_register: settings.start_register,
        }
    }
}

impl SerialConfig {
    /// Transport settings for the Modbus reader.
    pub fn settings(&self) -> SerialSettings {
        SerialSettings {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            timeout: Duration::from_millis(self.timeout_ms),
            unit_id: self.unit_id,
            start_register: self.start_register,
        }
    }
}

/// Local CSV output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the `<date key>/<file key>.csv` tree
    pub root_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("Scanner_Files"),
        }
    }
}

/// Calibration resource location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// `key:value` calibration file
    pub path: PathBuf,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("calibration_settings.txt"),
        }
    }
}

/// Remote folder store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Root of the directory-backed object store
    pub root_dir: PathBuf,
    /// Cached credential artifact
    pub credentials_path: PathBuf,
    /// Lifetime of an issued token
    pub token_ttl_secs: u64,
    /// How remote object names are derived from file names
    pub naming: RemoteNaming,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("remote_store"),
            credentials_path: PathBuf::from("credentials.json"),
            token_ttl_secs: 3600,
            naming: RemoteNaming::default(),
        }
    }
}

impl RemoteConfig {
    /// Token lifetime, saturating at the largest representable duration.
    pub fn token_ttl(&self) -> chrono::Duration {
        i64::try_from(self.token_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

/// Log output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// pretty, compact or json
    pub format: OutputFormat,
    /// Emit span open/close events
    pub span_events: bool,
    /// Include source file and line in each event
    pub file_and_line: bool,
    /// Colored output (pretty format only)
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: OutputFormat::Pretty,
            span_events: false,
            file_and_line: false,
            ansi: true,
        }
    }
}

impl AppConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::figment(path.as_ref()).extract().map_err(ConfigError::from)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_log_level(&self.logging.level).map_err(ConfigError::Validation)?;

        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::Validation(
                "serial.port must not be empty".to_string(),
            ));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Validation(
                "serial.baud_rate must be greater than zero".to_string(),
            ));
        }
        if self.serial.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "serial.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.remote.token_ttl_secs == 0 || self.remote.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::Validation(format!(
                "remote.token_ttl_secs must be between 1 and {MAX_TOKEN_TTL_SECS}"
            )));
        }
        Ok(())
    }

    /// Tracing settings for this configuration. Call after [`validate`](Self::validate).
    pub fn tracing(&self) -> Result<TracingConfig, ConfigError> {
        let level = parse_log_level(&self.logging.level).map_err(ConfigError::Validation)?;
        Ok(TracingConfig::new(level)
            .with_format(self.logging.format)
            .with_span_events(self.logging.span_events)
            .with_file_and_line(self.logging.file_and_line)
            .with_ansi(self.logging.ansi))
    }

    /// Effective configuration rendered as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.timeout_ms, 2000);
        assert_eq!(config.storage.root_dir, PathBuf::from("Scanner_Files"));
        assert_eq!(config.remote.naming, RemoteNaming::WithExtension);
    }

    #[test]
    fn file_and_env_layers_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "logger.toml",
                r#"
                [serial]
                port = "/dev/ttyS3"

                [remote]
                naming = "without_extension"

                [logging]
                format = "json"
                "#,
            )?;
            jail.set_env("FIELD_LOGGER_SERIAL__BAUD_RATE", "19200");
            jail.set_env("FIELD_LOGGER_LOGGING__LEVEL", "debug");

            let config = AppConfig::load_from("logger.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.serial.port, "/dev/ttyS3");
            assert_eq!(config.serial.baud_rate, 19200);
            assert_eq!(config.serial.unit_id, 1);
            assert_eq!(config.remote.naming, RemoteNaming::WithoutExtension);
            assert_eq!(config.logging.level, "debug");
            assert_eq!(config.logging.format, OutputFormat::Json);
            Ok(())
        });
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        Jail::expect_with(|_| {
            let config = AppConfig::load_from("absent.toml").map_err(|e| e.to_string())?;
            assert_eq!(config, AppConfig::default());
            Ok(())
        });
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.serial.baud_rate = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.serial.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.serial.port = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.remote.token_ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn token_ttl_is_bounded() {
        let mut config = AppConfig::default();
        config.remote.token_ttl_secs = MAX_TOKEN_TTL_SECS;
        assert!(config.validate().is_ok());
        assert_eq!(
            config.remote.token_ttl(),
            chrono::Duration::seconds(MAX_TOKEN_TTL_SECS as i64)
        );

        config.remote.token_ttl_secs = 9_000_000_000_000;
        assert!(config.validate().is_err());

        // Out-of-range values saturate instead of panicking.
        config.remote.token_ttl_secs = 10_000_000_000_000_000;
        assert!(config.validate().is_err());
        assert_eq!(config.remote.token_ttl(), chrono::Duration::MAX);
    }

    #[test]
    fn logging_section_reaches_tracing_config() {
        let mut config = AppConfig::default();
        config.logging.level = "warn".to_string();
        config.logging.format = OutputFormat::Compact;
        config.logging.span_events = true;
        config.logging.file_and_line = true;
        config.logging.ansi = false;

        let traced = config.tracing().unwrap();
        assert_eq!(traced.level, tracing::Level::WARN);
        assert_eq!(traced.format, OutputFormat::Compact);
        assert!(traced.with_span_events);
        assert!(traced.with_file_and_line);
        assert!(!traced.with_ansi);
    }

    #[test]
    fn serial_settings_carry_timeout() {
        let mut config = AppConfig::default();
        config.serial.timeout_ms = 500;
        assert_eq!(config.serial.settings().timeout, Duration::from_millis(500));
    }

    #[test]
    fn renders_as_toml() {
        let rendered = AppConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[serial]"));
        assert!(rendered.contains("naming = \"with_extension\""));
    }
}
