// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent configuration surface (spec.md §6 table).
//!
//! Loaded from a TOML file; every field may also be overridden by its
//! `PXP_AGENT_<FIELD>` environment variable, mirroring the env-override
//! idiom used for the daemon's `OJ_*` variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },

    #[error("missing required key: {0}")]
    MissingKey(&'static str),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// TLS material paths (spec.md §6 `ca`, `crt`, `key`, `crl`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsMaterial {
    pub ca: PathBuf,
    pub crt: PathBuf,
    pub key: PathBuf,
    pub crl: Option<PathBuf>,
}

/// Connector tuning knobs (spec.md §6 connector row).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorTuning {
    pub ws_connection_timeout_ms: u64,
    pub association_timeout_s: u64,
    pub association_request_ttl_s: u64,
    pub pcp_message_ttl_s: u64,
    pub allowed_keepalive_timeouts: u32,
    pub ping_interval_s: u64,
}

impl Default for ConnectorTuning {
    fn default() -> Self {
        Self {
            ws_connection_timeout_ms: 5_000,
            association_timeout_s: 15,
            association_request_ttl_s: 60,
            pcp_message_ttl_s: 60,
            allowed_keepalive_timeouts: 3,
            ping_interval_s: 60,
        }
    }
}

impl ConnectorTuning {
    pub fn ws_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.ws_connection_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_s)
    }
}

/// Task file download tuning (spec.md §6 task-download row).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDownloadTuning {
    pub task_download_connect_timeout_s: u64,
    pub task_download_timeout_s: u64,
}

impl Default for TaskDownloadTuning {
    fn default() -> Self {
        Self { task_download_connect_timeout_s: 10, task_download_timeout_s: 300 }
    }
}

/// PCP dialect the connector speaks (spec.md §6 `pcp_version`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PcpVersion {
    V1,
    V2,
}

/// The complete configuration surface consumed by the core (spec.md §6 table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub broker_ws_uris: Vec<String>,
    pub client_type: String,
    pub tls: TlsMaterial,

    pub spool_dir: PathBuf,
    pub spool_dir_purge_ttl_s: u64,

    pub modules_dir: PathBuf,
    pub modules_config_dir: PathBuf,

    pub task_cache_dir: PathBuf,
    pub task_cache_dir_purge_ttl_s: u64,

    pub master_uris: Vec<String>,
    pub master_proxy: Option<String>,

    pub pcp_version: PcpVersion,

    #[serde(default)]
    pub connector: ConnectorTuning,
    #[serde(default)]
    pub task_download: TaskDownloadTuning,

    pub max_message_size: usize,

    /// Rolling log file path; `None` means log to stderr (spec.md's
    /// logging-backend-selection seam, §1.1).
    #[serde(default)]
    pub logfile: Option<PathBuf>,
}

impl Configuration {
    /// Load from a TOML file, then apply `PXP_AGENT_*` environment overrides
    /// for the handful of fields operators commonly need to override without
    /// editing the file (spool/task-cache dirs, broker URIs).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let mut config: Configuration = toml::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("PXP_AGENT_SPOOL_DIR") {
            self.spool_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("PXP_AGENT_TASK_CACHE_DIR") {
            self.task_cache_dir = PathBuf::from(dir);
        }
        if let Ok(uris) = std::env::var("PXP_AGENT_BROKER_WS_URIS") {
            self.broker_ws_uris = uris.split(',').map(str::trim).map(str::to_string).collect();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.broker_ws_uris.is_empty() {
            return Err(ConfigError::MissingKey("broker_ws_uris"));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_message_size",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn spool_purge_ttl(&self) -> Duration {
        Duration::from_secs(self.spool_dir_purge_ttl_s)
    }

    pub fn task_cache_purge_ttl(&self) -> Duration {
        Duration::from_secs(self.task_cache_dir_purge_ttl_s)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
