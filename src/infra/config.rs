//! Configuration loading from TOML files
//!
//! The path comes from the `--config` argument, the `CONFIG_FILE`
//! environment variable or `config/dev.toml`, resolved by clap in `main`.

use crate::domain::types::{EventCode, Triggers, DESTINATION_TRIGGER, ORIGIN_TRIGGER};
use crate::io::gatt::DEFAULT_NAME_FILTERS;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Peripheral selection for the external BLE bridge (see `io::gatt`)
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Advertised-name fragments that identify the peripheral
    #[serde(default = "default_name_filters")]
    pub name_filters: Vec<String>,
    /// How long the transport may scan before giving up
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { name_filters: default_name_filters(), connect_timeout_ms: default_connect_timeout_ms() }
    }
}

fn default_name_filters() -> Vec<String> {
    DEFAULT_NAME_FILTERS.iter().map(|s| s.to_string()).collect()
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggersConfig {
    #[serde(default = "default_origin_trigger")]
    pub origin: u16,
    #[serde(default = "default_destination_trigger")]
    pub destination: u16,
}

impl Default for TriggersConfig {
    fn default() -> Self {
        Self { origin: default_origin_trigger(), destination: default_destination_trigger() }
    }
}

fn default_origin_trigger() -> u16 {
    ORIGIN_TRIGGER
}

fn default_destination_trigger() -> u16 {
    DESTINATION_TRIGGER
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Enable the TCP notification/fix feed
    #[serde(default = "default_listener_enabled")]
    pub enabled: bool,
    #[serde(default = "default_listener_port")]
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self { enabled: default_listener_enabled(), port: default_listener_port() }
    }
}

fn default_listener_enabled() -> bool {
    true
}

fn default_listener_port() -> u16 {
    25804
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PositionConfig {
    /// Reject fixes older than this (0 = accept any age)
    #[serde(default)]
    pub max_fix_age_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// File path for heading results (JSONL format, empty to disable)
    #[serde(default = "default_output_file")]
    pub file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { file: default_output_file() }
    }
}

fn default_output_file() -> String {
    "headings.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub triggers: TriggersConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub position: PositionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    device_name_filters: Vec<String>,
    connect_timeout_ms: u64,
    origin_trigger: u16,
    destination_trigger: u16,
    listener_enabled: bool,
    listener_port: u16,
    max_fix_age_ms: u64,
    output_file: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            device_name_filters: toml_config.device.name_filters,
            connect_timeout_ms: toml_config.device.connect_timeout_ms,
            origin_trigger: toml_config.triggers.origin,
            destination_trigger: toml_config.triggers.destination,
            listener_enabled: toml_config.listener.enabled,
            listener_port: toml_config.listener.port,
            max_fix_age_ms: toml_config.position.max_fix_age_ms,
            output_file: toml_config.output.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if toml_config.triggers.origin == toml_config.triggers.destination {
            anyhow::bail!(
                "Invalid config file {}: origin and destination triggers are both {}",
                path.display(),
                toml_config.triggers.origin
            );
        }

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn triggers(&self) -> Triggers {
        Triggers {
            origin: EventCode(self.origin_trigger),
            destination: EventCode(self.destination_trigger),
        }
    }

    pub fn device_name_filters(&self) -> &[String] {
        &self.device_name_filters
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn listener_enabled(&self) -> bool {
        self.listener_enabled
    }

    pub fn listener_port(&self) -> u16 {
        self.listener_port
    }

    pub fn max_fix_age(&self) -> Duration {
        Duration::from_millis(self.max_fix_age_ms)
    }

    /// Output file, or `None` when result egress is disabled
    pub fn output_file(&self) -> Option<&str> {
        if self.output_file.is_empty() {
            None
        } else {
            Some(&self.output_file)
        }
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to override the trigger codes
    #[cfg(test)]
    pub fn with_triggers(mut self, origin: u16, destination: u16) -> Self {
        self.origin_trigger = origin;
        self.destination_trigger = destination;
        self
    }
}
