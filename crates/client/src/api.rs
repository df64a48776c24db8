// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control-plane surface the connector core consumes.
//!
//! Operations are deliberately coarse: list/retrieve/update/callback, one
//! method per remote endpoint the core touches. Implementations own
//! authentication, serialization, and transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sim_core::{
    ConnectorError, Datapoint, ErrorKind, Integration, IntegrationUpdate, LogEntry, ModelRevision,
    ParsingState, RoutineRevision, RunCallback, RunCreate, RunStatus, RunValueItem, SimulationRun,
    Simulator, SimulatorCreate,
};
use thiserror::Error;

/// Errors surfaced by a [`ControlPlane`] implementation.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The control plane answered with a non-success status.
    #[error("Request to CDF failed with code {status}: {message}")]
    Status { status: u16, message: String },
    /// The request never produced a response (DNS, reset, timeout).
    #[error("CDF request transport failure: {0}")]
    Transport(String),
    /// The response body did not match the expected shape.
    #[error("CDF response decode failure: {0}")]
    Decode(String),
    /// Requested resource does not exist.
    #[error("{kind} not found: {external_id}")]
    NotFound { kind: &'static str, external_id: String },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Status { status, .. } => {
                ConnectorError::from_status(*status, String::new()).kind
            }
            ApiError::Transport(_) => ErrorKind::NetworkTransient,
            ApiError::Decode(_) => ErrorKind::Internal,
            ApiError::NotFound { .. } => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ApiError> for ConnectorError {
    fn from(err: ApiError) -> Self {
        let mut out = ConnectorError::new(err.kind(), err.to_string());
        out.status = err.status();
        out
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Result of inspecting the current token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub subject: String,
    #[serde(default)]
    pub projects: Vec<String>,
}

/// Create/upsert payload for a connector integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationCreate {
    pub external_id: String,
    pub simulator_external_id: String,
    pub data_set_id: i64,
    pub connector_version: String,
    pub simulator_version: String,
}

/// The resolved input/output values recorded for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunData {
    pub run_id: i64,
    #[serde(default)]
    pub inputs: Vec<RunValueItem>,
    #[serde(default)]
    pub outputs: Vec<RunValueItem>,
}

/// Create/upsert payload for an extraction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionPipelineCreate {
    pub external_id: String,
    pub name: String,
    pub data_set_id: i64,
}

/// Status of a reported extraction-pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionRunStatus {
    Success,
    Failure,
    Seen,
}

/// One extraction-pipeline run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRunCreate {
    pub external_id: String,
    pub status: ExtractionRunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Filter for model revision listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRevisionFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulator_external_id: Option<String>,
    /// Only revisions whose remote `lastUpdatedTime` is at or after this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated_after: Option<i64>,
}

/// Filter for routine revision listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineRevisionFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulator_external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_after: Option<i64>,
}

/// Filter for simulation run listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulator_external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
}

/// Typed operations against the control plane.
///
/// Implementations must be safe for concurrent use; every connector activity
/// shares one client.
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    // ── Auth & identity ─────────────────────────────────────────────
    async fn token_inspect(&self) -> ApiResult<TokenInfo>;
    async fn upsert_simulator(&self, simulator: SimulatorCreate) -> ApiResult<Simulator>;
    async fn list_simulators(&self) -> ApiResult<Vec<Simulator>>;
    async fn list_integrations(&self, simulator_external_id: &str) -> ApiResult<Vec<Integration>>;
    async fn upsert_integration(&self, create: IntegrationCreate) -> ApiResult<Integration>;
    async fn update_integration(&self, id: i64, update: IntegrationUpdate) -> ApiResult<()>;
    async fn upsert_extraction_pipeline(
        &self,
        create: ExtractionPipelineCreate,
    ) -> ApiResult<()>;
    async fn create_extraction_run(&self, item: ExtractionRunCreate) -> ApiResult<()>;

    // ── Model revisions ─────────────────────────────────────────────
    async fn list_model_revisions(
        &self,
        filter: ModelRevisionFilter,
        cursor: Option<String>,
        limit: usize,
    ) -> ApiResult<Page<ModelRevision>>;
    async fn model_revision_by_external_id(&self, external_id: &str) -> ApiResult<ModelRevision>;
    async fn update_parsing_status(&self, revision_id: i64, state: ParsingState) -> ApiResult<()>;

    // ── Routine revisions ───────────────────────────────────────────
    async fn list_routine_revisions(
        &self,
        filter: RoutineRevisionFilter,
        cursor: Option<String>,
        limit: usize,
    ) -> ApiResult<Page<RoutineRevision>>;
    async fn routine_revision_by_external_id(
        &self,
        external_id: &str,
    ) -> ApiResult<RoutineRevision>;

    // ── Simulation runs ─────────────────────────────────────────────
    async fn list_runs(&self, filter: RunFilter) -> ApiResult<Vec<SimulationRun>>;
    async fn create_runs(&self, items: Vec<RunCreate>) -> ApiResult<Vec<SimulationRun>>;
    async fn run_by_id(&self, id: i64) -> ApiResult<SimulationRun>;
    async fn update_run(&self, callback: RunCallback) -> ApiResult<SimulationRun>;
    async fn list_run_data(&self, run_id: i64) -> ApiResult<RunData>;

    // ── Files ───────────────────────────────────────────────────────
    async fn file_download_link(&self, file_id: i64) -> ApiResult<String>;

    // ── Time series ─────────────────────────────────────────────────
    async fn latest_datapoint(
        &self,
        ts_external_id: &str,
        before: i64,
    ) -> ApiResult<Option<Datapoint>>;
    async fn datapoints_window(
        &self,
        ts_external_id: &str,
        start: i64,
        end: i64,
    ) -> ApiResult<Vec<Datapoint>>;
    async fn insert_datapoint(&self, ts_external_id: &str, point: Datapoint) -> ApiResult<()>;

    // ── Logs ────────────────────────────────────────────────────────
    async fn append_logs(&self, log_id: i64, entries: Vec<LogEntry>) -> ApiResult<()>;
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
