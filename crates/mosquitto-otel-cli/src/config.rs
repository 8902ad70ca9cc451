//! `config.toml` loading with environment overrides.
//!
//! ```toml
//! msgqueue = true
//!
//! [mqtt]
//! host = "broker.local"
//! port = 1883
//! username = "monitor"
//! password = "secret"
//!
//! [otlp]
//! endpoint = "http://collector:4317"
//! ```
//!
//! `MQTT_HOST`, `MQTT_PORT`, `MQTT_USERNAME`, `MQTT_PASSWORD` and `MSGQUEUE`
//! take precedence over the file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("environment variable {var}={value:?} is not a valid {expected}")]
    Env {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: "username".to_string(),
            password: "password".to_string(),
            client_id: "oltp-mosquitto".to_string(),
        }
    }
}

/// Metrics export settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OtlpConfig {
    pub endpoint: String,
    pub export_interval_secs: u64,
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4317".to_string(),
            export_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub otlp: OtlpConfig,
    /// Poll System V message-queue depth.
    pub msgqueue: bool,
    pub msgqueue_interval_secs: u64,
    /// Kernel queue table index passed to `MSG_STAT`.
    pub msgqueue_index: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            otlp: OtlpConfig::default(),
            msgqueue: false,
            msgqueue_interval_secs: mosquitto_otel_core::DEFAULT_INTERVAL.as_secs(),
            msgqueue_index: 0,
        }
    }
}

impl Config {
    /// Read `path`, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from variables returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MQTT_HOST") {
            self.mqtt.host = v;
        }
        if let Some(v) = lookup("MQTT_PORT") {
            self.mqtt.port = v.trim().parse().map_err(|_| ConfigError::Env {
                var: "MQTT_PORT",
                value: v.clone(),
                expected: "port number",
            })?;
        }
        if let Some(v) = lookup("MQTT_USERNAME") {
            self.mqtt.username = v;
        }
        if let Some(v) = lookup("MQTT_PASSWORD") {
            self.mqtt.password = v;
        }
        if let Some(v) = lookup("MSGQUEUE") {
            self.msgqueue = parse_bool(&v).ok_or_else(|| ConfigError::Env {
                var: "MSGQUEUE",
                value: v.clone(),
                expected: "boolean",
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.host is empty".to_string()));
        }
        if self.msgqueue_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "msgqueue_interval_secs must be positive".to_string(),
            ));
        }
        if self.otlp.export_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "otlp.export_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
