use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::acquisition::{AcquisitionPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_OUTPUT_DIR: &str = "data";
pub const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No devices passed and no config file found at {0}")]
    Missing(PathBuf),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid serial number passed. Must be integers separated by commas. Received: {0}")]
    InvalidSerial(String),

    #[error("No devices configured")]
    NoDevices,
}

/// A sensor device to poll.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(deserialize_with = "serial_from_json")]
    pub serial: u64,
}

impl DeviceDescriptor {
    pub fn new(name: Option<&str>, serial: u64) -> Self {
        Self {
            name: name.map(str::to_string),
            serial,
        }
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("Device-{}", self.serial),
        }
    }
}

/// Serials may be written as JSON integers or as integer strings.
fn serial_from_json<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawSerial {
        Number(u64),
        Text(String),
    }

    match RawSerial::deserialize(deserializer)? {
        RawSerial::Number(serial) => Ok(serial),
        RawSerial::Text(text) => text.trim().parse().map_err(|_| {
            serde::de::Error::custom(format!("serial {:?} is not an integer", text))
        }),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub devices: Vec<DeviceDescriptor>,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
    pub acquisition: AcquisitionConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub logfile: LogFileConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogFileConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl LoggingConfig {
    /// Directory for the daily log file, if file logging is switched on.
    pub fn file_dir(&self) -> Option<&Path> {
        (self.enabled && self.logfile.enabled).then_some(self.logfile.path.as_path())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_secs: DEFAULT_RETRY_DELAY.as_secs(),
        }
    }
}

impl AcquisitionConfig {
    pub fn policy(&self) -> AcquisitionPolicy {
        AcquisitionPolicy {
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            timeout_secs: 5,
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Parse a flat `1234,5678` list into descriptors without names.
pub fn parse_device_serials(list: &str) -> Result<Vec<DeviceDescriptor>, ConfigError> {
    list.split(',')
        .map(|part| {
            part.trim()
                .parse()
                .map(|serial| DeviceDescriptor::new(None, serial))
                .map_err(|_| ConfigError::InvalidSerial(list.to_string()))
        })
        .collect()
}

pub fn load(path: &Path) -> Result<Settings, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Settings for one run. A serial list on the command line replaces the
/// config file entirely and turns on console logging only.
pub fn resolve(config_path: &Path, device_serials: Option<&str>) -> Result<Settings, ConfigError> {
    let settings = match device_serials {
        Some(list) => Settings {
            devices: parse_device_serials(list)?,
            logging: LoggingConfig {
                enabled: true,
                ..LoggingConfig::default()
            },
            ..Settings::default()
        },
        None => load(config_path)?,
    };

    if settings.devices.is_empty() {
        return Err(ConfigError::NoDevices);
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn cli_list_builds_unnamed_devices() {
        let settings = resolve(Path::new("does-not-exist.json"), Some("101, 202,303")).unwrap();

        assert_eq!(
            settings.devices,
            vec![
                DeviceDescriptor::new(None, 101),
                DeviceDescriptor::new(None, 202),
                DeviceDescriptor::new(None, 303),
            ]
        );
        assert_eq!(settings.output.path, PathBuf::from("data"));
        assert!(settings.logging.enabled);
        assert_eq!(settings.logging.file_dir(), None);
        assert_eq!(settings.acquisition.policy(), AcquisitionPolicy::default());
    }

    #[test]
    fn cli_list_rejects_non_integers() {
        let err = parse_device_serials("12,abc").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSerial(ref list) if list == "12,abc"));
        assert!(parse_device_serials("").is_err());
    }

    #[test]
    fn missing_config_without_serials_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(&dir.path().join("config.json"), None).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn full_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "devices": [
                    { "name": "Bedroom", "serial": 2930012345 },
                    { "serial": "2930054321" }
                ],
                "output": { "path": "/var/lib/waveplus" },
                "logging": { "enabled": true, "logfile": { "enabled": true, "path": "/var/log/waveplus" } },
                "acquisition": { "max_attempts": 3, "retry_delay_secs": 10 },
                "gateway": { "host": "pi.local", "port": 7000 }
            }"#,
        )
        .unwrap();

        let settings = resolve(&path, None).unwrap();
        assert_eq!(settings.devices[0].display_name(), "Bedroom");
        assert_eq!(settings.devices[1].serial, 2930054321);
        assert_eq!(settings.devices[1].display_name(), "Device-2930054321");
        assert_eq!(settings.output.path, PathBuf::from("/var/lib/waveplus"));
        assert_eq!(
            settings.logging.file_dir(),
            Some(Path::new("/var/log/waveplus"))
        );
        assert_eq!(settings.acquisition.policy().max_attempts, 3);
        assert_eq!(settings.acquisition.policy().retry_delay, Duration::from_secs(10));
        assert_eq!(settings.gateway.host, "pi.local");
        assert_eq!(settings.gateway.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn logfile_needs_logging_enabled() {
        let settings: Settings = serde_json::from_str(
            r#"{ "devices": [{ "serial": 1 }], "logging": { "logfile": { "enabled": true } } }"#,
        )
        .unwrap();
        assert_eq!(settings.logging.file_dir(), None);
        assert_eq!(settings.output.path, PathBuf::from(DEFAULT_OUTPUT_DIR));
    }

    #[test]
    fn bad_serial_in_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "devices": [{ "serial": "kitchen" }] }"#).unwrap();

        assert!(matches!(resolve(&path, None), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn empty_device_list_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "devices": [] }"#).unwrap();

        assert!(matches!(resolve(&path, None), Err(ConfigError::NoDevices)));
    }
}
