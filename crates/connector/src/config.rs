// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connector configuration: TOML file plus environment overrides.
//!
//! Keys mirror the remote configuration surface (camelCase). The
//! `COGNITE_*` environment variables override the `[cognite]` section so
//! deployments can keep credentials out of the file.

use serde::Deserialize;
use sim_driver::AutomationConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Control-plane connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CogniteSection {
    pub host: String,
    pub project: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
}

/// Core connector identity and cadence settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectorSection {
    /// Integration external-id prefix.
    pub name_prefix: String,
    /// Append `@<hostname>` to the integration external id.
    pub add_machine_name_suffix: bool,
    pub data_set_id: i64,
    /// Heartbeat interval, seconds.
    pub status_interval: u64,
    /// Bounded wait for in-flight work on shutdown/restart, seconds.
    pub drain_timeout_seconds: u64,
    /// Delay before a supervised restart, seconds.
    pub restart_delay_seconds: u64,
}

impl Default for ConnectorSection {
    fn default() -> Self {
        Self {
            name_prefix: "simulator-connector".into(),
            add_machine_name_suffix: true,
            data_set_id: 0,
            status_interval: 10,
            drain_timeout_seconds: 5,
            restart_delay_seconds: 10,
        }
    }
}

/// Simulator definition registered at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulatorSection {
    pub external_id: String,
    pub name: String,
    pub file_extension_types: Vec<String>,
}

impl Default for SimulatorSection {
    fn default() -> Self {
        Self {
            external_id: "UNKNOWN".into(),
            name: "Unknown simulator".into(),
            file_extension_types: vec!["csv".into()],
        }
    }
}

/// Model library settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelLibrarySection {
    pub files_directory: PathBuf,
    pub state_store_file: PathBuf,
    /// Remote poll interval, seconds.
    pub library_update_interval: u64,
    /// State persistence flush interval, seconds.
    pub state_flush_interval: u64,
    pub pagination_limit: usize,
    pub max_download_attempts: u32,
    /// Hard download cap, bytes.
    pub max_file_download_size: u64,
    /// Soft (defer) download cap, bytes.
    pub large_file_size: u64,
}

impl Default for ModelLibrarySection {
    fn default() -> Self {
        Self {
            files_directory: PathBuf::from("./files"),
            state_store_file: PathBuf::from("./state.db"),
            library_update_interval: 10,
            state_flush_interval: 10,
            pagination_limit: 100,
            max_download_attempts: 3,
            max_file_download_size: 8 * 1024 * 1024 * 1024,
            large_file_size: 1024 * 1024 * 1024,
        }
    }
}

/// Routine library settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutineLibrarySection {
    pub library_update_interval: u64,
    pub pagination_limit: usize,
}

impl Default for RoutineLibrarySection {
    fn default() -> Self {
        Self { library_update_interval: 10, pagination_limit: 100 }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerSection {
    pub update_interval: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self { update_interval: 10 }
    }
}

/// Runner settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerSection {
    pub poll_interval: u64,
    pub max_concurrent_runs: usize,
    pub run_timeout_seconds: u64,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self { poll_interval: 5, max_concurrent_runs: 4, run_timeout_seconds: 600 }
    }
}

/// Remote log sink settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteLoggerSection {
    pub enabled: bool,
    pub level: String,
    /// Out-of-band flush interval, seconds.
    pub flush_interval: u64,
}

impl Default for RemoteLoggerSection {
    fn default() -> Self {
        Self { enabled: true, level: "information".into(), flush_interval: 5 }
    }
}

/// Local logging settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggerSection {
    pub remote: RemoteLoggerSection,
    /// Optional local log file (rolling, daily).
    pub file: Option<PathBuf>,
}

/// The complete connector configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectorConfig {
    pub cognite: CogniteSection,
    pub connector: ConnectorSection,
    pub simulator: SimulatorSection,
    pub model_library: ModelLibrarySection,
    pub routine_library: RoutineLibrarySection,
    pub scheduler: SchedulerSection,
    pub runner: RunnerSection,
    pub logger: LoggerSection,
    /// Simulator-specific options, passed to the driver untouched.
    pub automation: AutomationConfig,
}

impl ConnectorConfig {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let mut config: ConnectorConfig = toml::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source: Box::new(source) })?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides for the `[cognite]` section.
    pub fn apply_env(&mut self) {
        env_override(&mut self.cognite.host, "COGNITE_HOST");
        env_override(&mut self.cognite.project, "COGNITE_PROJECT");
        env_override(&mut self.cognite.token_url, "COGNITE_TOKEN_URL");
        env_override(&mut self.cognite.client_id, "COGNITE_CLIENT_ID");
        env_override(&mut self.cognite.client_secret, "COGNITE_CLIENT_SECRET");
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cognite.host.is_empty() {
            return Err(ConfigError::Missing("cognite.host (or COGNITE_HOST)"));
        }
        if self.cognite.project.is_empty() {
            return Err(ConfigError::Missing("cognite.project (or COGNITE_PROJECT)"));
        }
        Ok(())
    }

    /// The integration external id this connector registers under.
    pub fn integration_external_id(&self) -> String {
        if self.connector.add_machine_name_suffix {
            format!("{}@{}", self.connector.name_prefix, machine_name())
        } else {
            self.connector.name_prefix.clone()
        }
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.connector.status_interval)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.connector.drain_timeout_seconds)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.connector.restart_delay_seconds)
    }
}

fn env_override(target: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *target = value;
        }
    }
}

fn machine_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
