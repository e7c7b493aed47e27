//! Configuration system for Terra.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $TERRA_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/terra/config.toml
//!   3. ~/.config/terra/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::{DEFAULT_CONTROLLER_PORT, SHUTDOWN_GRACE_SECS};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerraConfig {
    pub controller: ControllerConfig,
    pub client: ClientSettings,
    pub dispatch: DispatchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Address the RPC server binds, e.g. "0.0.0.0:50051".
    pub listen_addr: String,
    /// Port for the local HTTP status API. 0 = disabled.
    pub api_port: u16,
    /// Finished batch records kept in memory. 0 = keep everything.
    pub retained_batches: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Controller RPC address, "host:port".
    pub controller_addr: String,
    pub connect_timeout_ms: u64,
    /// Per-call deadline. 0 = wait forever.
    pub request_timeout_ms: u64,
    /// How long `close` waits for in-flight calls.
    pub shutdown_grace_ms: u64,
    /// Outbound frames buffered per channel before `submit` is rejected.
    pub outbound_queue: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Where the go-ahead for a transfer comes from.
    pub confirmation: ConfirmationKind,
    /// What performs the transfer.
    pub executor: ExecutorKind,
    /// Data paths are truncated just after the last path component equal to
    /// this marker.
    pub output_marker: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationKind {
    /// One byte from the operator's stdin per dispatch.
    Stdin,
    /// Proceed without waiting.
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// `scp -r` the data directory to the destination host.
    Scp,
    /// Log the directive and do nothing.
    LogOnly,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{}", DEFAULT_CONTROLLER_PORT),
            api_port: 9101,
            retained_batches: 10_000,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            controller_addr: format!("127.0.0.1:{}", DEFAULT_CONTROLLER_PORT),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 0,
            shutdown_grace_ms: SHUTDOWN_GRACE_SECS * 1000,
            outbound_queue: 64,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            confirmation: ConfirmationKind::Stdin,
            executor: ExecutorKind::Scp,
            output_marker: "output".to_string(),
        }
    }
}

impl ClientSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("terra")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl TerraConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file(&Self::file_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a config file, or return defaults if it does not exist.
    pub fn load_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(TerraConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("TERRA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&TerraConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply TERRA_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("TERRA_CONTROLLER__LISTEN_ADDR") {
            self.controller.listen_addr = v;
        }
        if let Some(p) = var("TERRA_CONTROLLER__API_PORT").and_then(|v| v.parse().ok()) {
            self.controller.api_port = p;
        }
        if let Some(n) = var("TERRA_CONTROLLER__RETAINED_BATCHES").and_then(|v| v.parse().ok()) {
            self.controller.retained_batches = n;
        }
        if let Some(v) = var("TERRA_CLIENT__CONTROLLER_ADDR") {
            self.client.controller_addr = v;
        }
        if let Some(ms) = var("TERRA_CLIENT__REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.client.request_timeout_ms = ms;
        }
        if let Some(ms) = var("TERRA_CLIENT__SHUTDOWN_GRACE_MS").and_then(|v| v.parse().ok()) {
            self.client.shutdown_grace_ms = ms;
        }
        if let Some(v) = var("TERRA_DISPATCH__CONFIRMATION") {
            match v.as_str() {
                "stdin" => self.dispatch.confirmation = ConfirmationKind::Stdin,
                "auto" => self.dispatch.confirmation = ConfirmationKind::Auto,
                _ => {}
            }
        }
        if let Some(v) = var("TERRA_DISPATCH__EXECUTOR") {
            match v.as_str() {
                "scp" => self.dispatch.executor = ExecutorKind::Scp,
                "log_only" => self.dispatch.executor = ExecutorKind::LogOnly,
                _ => {}
            }
        }
        if let Some(v) = var("TERRA_DISPATCH__OUTPUT_MARKER") {
            self.dispatch.output_marker = v;
        }
    }
}
