//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the
//! proximity-config.toml file. It covers the sensor wiring, the detection
//! threshold and cadence, the upload endpoint, the camera utility and the
//! status endpoint. Configuration is read once at startup and never mutated.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_PATH: &str = "proximity-config.toml";

/// Invalid configuration values, or a failure writing the configuration out.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("threshold_cm must be positive, got {0}")]
    Threshold(f64),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("upload endpoint is empty")]
    EmptyEndpoint,

    #[error("jpeg_quality must be within 1..=100, got {0}")]
    JpegQuality(u8),

    #[error("trigger and echo cannot share GPIO {0}")]
    SharedPin(u8),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write configuration file: {0}")]
    Io(#[from] std::io::Error),
}

/// Application configuration loaded from proximity-config.toml
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Ultrasonic sensor wiring and timing
    pub sensor: SensorConfig,
    /// Detection threshold and sampling cadence
    pub monitor: MonitorConfig,
    /// Remote recognition service
    pub upload: UploadConfig,
    /// External capture utility
    pub camera: CameraConfig,
    /// Liveness endpoint
    pub status: StatusConfig,
}

/// Ultrasonic sensor configuration (BCM pin numbering)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    /// Trigger line (output), physical pin 16 by default
    pub trigger_pin: u8,
    /// Echo line (input), physical pin 18 by default
    pub echo_pin: u8,
    /// Width of the trigger pulse in microseconds
    pub trigger_pulse_us: u64,
    /// Maximum wait for each echo edge in milliseconds.
    /// 60 ms covers the ~4 m range of an HC-SR04 with margin.
    pub echo_timeout_ms: u64,
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Objects strictly closer than this (cm) count as detected
    pub threshold_cm: f64,
    /// Pause between sampling cycles in milliseconds
    pub interval_ms: u64,
}

/// How the encoded image travels in the POST body
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// `multipart/form-data` with the JPEG as a file field
    Multipart,
    /// The JPEG bytes as the whole body, `Content-Type: image/jpeg`
    RawJpeg,
}

/// Upload configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    /// Full URL of the recognition endpoint
    pub endpoint: String,
    pub format: PayloadFormat,
    /// Form field name used in multipart mode
    pub field_name: String,
    /// JPEG encoder quality (1-100)
    pub jpeg_quality: u8,
}

/// External capture utility configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Executable invoked for each capture
    pub command: String,
    /// Extra arguments placed before `-o <path>`
    pub args: Vec<String>,
}

/// Status endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    /// Socket address to listen on
    pub bind_addr: String,
    /// Static body returned from `/`
    pub message: String,
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            trigger_pin: 23,
            echo_pin: 24,
            trigger_pulse_us: 10,
            echo_timeout_ms: 60,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            threshold_cm: 150.0, // 1.5 meters
            interval_ms: 1000,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            endpoint: "http://localhost:3300/predict".to_string(),
            format: PayloadFormat::Multipart,
            field_name: "image".to_string(),
            jpeg_quality: 85,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig {
            command: "libcamera-jpeg".to_string(),
            args: Vec::new(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        StatusConfig {
            enabled: true,
            bind_addr: "0.0.0.0:8080".to_string(),
            message: "Face Recognition Server Running".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sensor: SensorConfig::default(),
            monitor: MonitorConfig::default(),
            upload: UploadConfig::default(),
            camera: CameraConfig::default(),
            status: StatusConfig::default(),
        }
    }
}

impl SensorConfig {
    pub fn trigger_pulse(&self) -> Duration {
        Duration::from_micros(self.trigger_pulse_us)
    }

    pub fn echo_timeout(&self) -> Duration {
        Duration::from_millis(self.echo_timeout_ms)
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Config {
    /// Load configuration from proximity-config.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    log::info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Invalid config file format in {}: {}", path.display(), e);
                    log::warn!("Using default configuration");
                    Self::default()
                }
            },
            Err(_) => {
                log::info!(
                    "No config file found at {}, using default configuration",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Save current configuration as pretty TOML
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        log::info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.monitor.threshold_cm;
        if !(threshold > 0.0 && threshold.is_finite()) {
            return Err(ConfigError::Threshold(threshold));
        }
        if self.monitor.interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("interval_ms"));
        }
        if self.sensor.echo_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("echo_timeout_ms"));
        }
        if self.sensor.trigger_pulse_us == 0 {
            return Err(ConfigError::ZeroDuration("trigger_pulse_us"));
        }
        if self.sensor.trigger_pin == self.sensor.echo_pin {
            return Err(ConfigError::SharedPin(self.sensor.trigger_pin));
        }
        if self.upload.endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        if !(1..=100).contains(&self.upload.jpeg_quality) {
            return Err(ConfigError::JpegQuality(self.upload.jpeg_quality));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sensor.trigger_pin, 23);
        assert_eq!(config.sensor.echo_pin, 24);
        assert_eq!(config.monitor.threshold_cm, 150.0);
        assert_eq!(config.monitor.interval(), Duration::from_secs(1));
        assert_eq!(config.upload.endpoint, "http://localhost:3300/predict");
        assert_eq!(config.upload.format, PayloadFormat::Multipart);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [monitor]
            threshold_cm = 80.0

            [upload]
            format = "raw_jpeg"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.monitor.threshold_cm, 80.0);
        assert_eq!(parsed.monitor.interval_ms, 1000);
        assert_eq!(parsed.upload.format, PayloadFormat::RawJpeg);
        assert_eq!(parsed.upload.field_name, "image");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        // Should fallback to default
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_invalid_file_falls_back() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "this is = = not toml").unwrap();
        assert_eq!(Config::load_from_path(file.path()), Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.monitor.interval_ms = 250;
        config.camera.args = vec!["--nopreview".to_string()];
        config.save_to_path(file.path()).unwrap();

        assert_eq!(Config::load_from_path(file.path()), config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.monitor.threshold_cm = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Threshold(t)) if t == 0.0));

        let mut config = Config::default();
        config.monitor.interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroDuration("interval_ms"))));

        let mut config = Config::default();
        config.sensor.echo_pin = config.sensor.trigger_pin;
        assert!(matches!(config.validate(), Err(ConfigError::SharedPin(23))));

        let mut config = Config::default();
        config.upload.endpoint = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyEndpoint)));

        let mut config = Config::default();
        config.upload.jpeg_quality = 0;
        assert!(matches!(config.validate(), Err(ConfigError::JpegQuality(0))));
    }

    #[test]
    fn test_save_reports_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("proximity-config.toml");

        let err = Config::default().save_to_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
        assert!(err.to_string().starts_with("failed to write configuration file"));
    }
}
