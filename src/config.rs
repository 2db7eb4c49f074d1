// src/config.rs

//! Manages relay configuration: loading, defaults and validation.

use crate::connection::ConnectionSettings;
use crate::core::notice::DEFAULT_WELCOME;
use crate::core::protocol::{DEFAULT_MAX_MESSAGE_SIZE, Framing};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

/// The `[metrics]` table: an optional Prometheus scrape endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve `/metrics` over HTTP.
    #[serde(default)]
    pub enabled: bool,
    /// Must differ from the relay port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9555
}

/// The file as written, every key optional.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_backlog")]
    backlog: u32,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    framing: Framing,
    #[serde(default = "default_max_message_size")]
    max_message_size: usize,
    #[serde(default = "default_send_timeout", with = "humantime_serde")]
    send_timeout: Duration,
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    shutdown_timeout: Duration,
    #[serde(default = "default_welcome_message")]
    welcome_message: String,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5555
}
fn default_backlog() -> u32 {
    10
}
fn default_max_clients() -> usize {
    1024
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}
fn default_send_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_welcome_message() -> String {
    DEFAULT_WELCOME.to_string()
}

/// Represents the final, validated relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Maximum number of pending, not yet accepted connections.
    pub backlog: u32,
    /// Maximum number of simultaneously served connections.
    pub max_clients: usize,
    pub log_level: String,
    pub framing: Framing,
    pub max_message_size: usize,
    #[serde(with = "humantime_serde")]
    pub send_timeout: Duration,
    /// How long shutdown waits for connection handlers before aborting them.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    pub welcome_message: String,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
            max_clients: default_max_clients(),
            log_level: default_log_level(),
            framing: Framing::default(),
            max_message_size: default_max_message_size(),
            send_timeout: default_send_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            welcome_message: default_welcome_message(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        Self {
            host: raw.host,
            port: raw.port,
            backlog: raw.backlog,
            max_clients: raw.max_clients,
            log_level: raw.log_level,
            framing: raw.framing,
            max_message_size: raw.max_message_size,
            send_timeout: raw.send_timeout,
            shutdown_timeout: raw.shutdown_timeout,
            welcome_message: raw.welcome_message,
            metrics: raw.metrics,
        }
    }
}

impl Config {
    /// Reads, parses and validates the TOML file at `path`.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Cannot read config file '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config in '{path}'"))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(contents).context("Malformed TOML configuration")?;
        let config = Config::from(raw);
        config.validate()?;
        Ok(config)
    }

    /// The `host:port` string the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The transport parameters handed to every accepted connection.
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            framing: self.framing,
            max_message_size: self.max_message_size,
            send_timeout: self.send_timeout,
        }
    }

    /// Rejects values the listener cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port must not be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host must not be empty"));
        }
        if self.backlog == 0 {
            return Err(anyhow!("backlog must be at least 1"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients must be at least 1"));
        }
        if self.max_clients > Semaphore::MAX_PERMITS {
            return Err(anyhow!(
                "max_clients must not exceed {}",
                Semaphore::MAX_PERMITS
            ));
        }
        if self.max_message_size == 0 {
            return Err(anyhow!("max_message_size must be at least 1"));
        }
        if self.send_timeout.is_zero() {
            return Err(anyhow!("send_timeout must be greater than zero"));
        }
        if self.shutdown_timeout.is_zero() {
            warn!("shutdown_timeout is 0: connection handlers will be aborted immediately on shutdown.");
        }
        if self.framing == Framing::Raw && self.max_message_size > 64 * 1024 {
            warn!(
                "max_message_size of {} bytes with raw framing: messages are cut at read boundaries regardless.",
                self.max_message_size
            );
        }

        match self.metrics.port {
            _ if !self.metrics.enabled => Ok(()),
            0 => Err(anyhow!("metrics.port must not be 0")),
            port if port == self.port => Err(anyhow!(
                "metrics.port {port} collides with the relay port"
            )),
            _ => Ok(()),
        }
    }
}
