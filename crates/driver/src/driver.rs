// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `SimulatorDriver` trait and its data shapes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sim_core::{ConnectorError, ErrorKind, RoutineRevision, RunValueItem};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Simulator-specific configuration, passed through from the `automation`
/// config section without interpretation by the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationConfig {
    /// COM program id / executable name, when the engine needs one.
    #[serde(default)]
    pub program_id: Option<String>,
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

/// Errors from simulator driver operations
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// The model file could not be opened or understood by the engine.
    #[error("model parse failed: {0}")]
    ParseFailure(String),
    /// The engine rejected or aborted the simulation; the message is
    /// user-visible on the run.
    #[error("{0}")]
    SimulatorFailure(String),
    #[error("simulator connection failed: {0}")]
    ConnectionFailed(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl DriverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::ParseFailure(_) => ErrorKind::ParseFailure,
            DriverError::SimulatorFailure(_) => ErrorKind::SimulatorFailure,
            DriverError::ConnectionFailed(_) => ErrorKind::SimulatorFailure,
            DriverError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<DriverError> for ConnectorError {
    fn from(err: DriverError) -> Self {
        ConnectorError::new(err.kind(), err.to_string())
    }
}

/// One materialized dependency file handed to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFileRef {
    pub file_id: i64,
    /// Absent when the file could not be materialized; the driver decides
    /// whether it can proceed without it.
    pub path: Option<PathBuf>,
    pub arguments: HashMap<String, String>,
}

/// The on-disk shape of a model revision, as the driver sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFiles {
    pub revision_external_id: String,
    pub primary_path: PathBuf,
    pub extension: Option<String>,
    pub dependencies: Vec<ModelFileRef>,
}

/// Information extracted from a successfully parsed model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Engine-reported model version or flowsheet revision, when available.
    pub model_version: Option<String>,
    /// Addressable nodes/streams discovered in the model.
    pub addresses: Vec<String>,
}

/// Lifecycle and execution hooks for one simulation engine.
///
/// Implementations own process/COM lifecycle; `pre_shutdown` runs before the
/// connector exits so the engine can release licenses and temp files.
#[async_trait]
pub trait SimulatorDriver: Send + Sync + 'static {
    /// Connect to (or launch) the engine. Called once per supervised start.
    async fn initialize(&self, config: &AutomationConfig) -> Result<(), DriverError>;

    /// Engine version string published with the heartbeat.
    fn simulator_version(&self) -> String;

    /// Open and parse a materialized model, returning what the engine could
    /// extract from it. A `ParseFailure` is terminal for the revision until
    /// the remote resets its status.
    async fn extract_model_information(&self, model: &ModelFiles)
        -> Result<ModelInfo, DriverError>;

    /// Execute a routine revision against a parsed model. Returns outputs
    /// keyed by reference id.
    async fn run_simulation(
        &self,
        model: &ModelFiles,
        revision: &RoutineRevision,
        inputs: &[RunValueItem],
    ) -> Result<HashMap<String, f64>, DriverError>;

    /// Hook invoked before the connector stops the engine.
    async fn pre_shutdown(&self) -> Result<(), DriverError> {
        Ok(())
    }
}
