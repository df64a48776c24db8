// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mock control plane for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::api::{
    ApiError, ApiResult, ControlPlane, ExtractionPipelineCreate, ExtractionRunCreate,
    ExtractionRunStatus, IntegrationCreate, ModelRevisionFilter, Page, RoutineRevisionFilter,
    RunData, RunFilter, TokenInfo,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use sim_core::{
    Datapoint, Integration, IntegrationUpdate, LogEntry, ModelRevision, ParsingState,
    ParsingStatus, RoutineRevision, RunCallback, RunCreate, RunStatus, SimulationRun, Simulator,
    SimulatorCreate,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Recorded call to MockControlPlane
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    TokenInspect,
    UpsertSimulator(String),
    ListSimulators,
    ListIntegrations,
    UpsertIntegration(String),
    UpdateIntegration { id: i64, heartbeat: i64 },
    UpsertExtractionPipeline(String),
    CreateExtractionRun { external_id: String, status: ExtractionRunStatus },
    ListModelRevisions,
    ModelRevisionByExternalId(String),
    UpdateParsingStatus { revision_id: i64, status: ParsingStatus },
    ListRoutineRevisions,
    RoutineRevisionByExternalId(String),
    ListRuns,
    RunById(i64),
    ListRunData(i64),
    CreateRuns(usize),
    UpdateRun { id: i64, status: RunStatus },
    FileDownloadLink(i64),
    LatestDatapoint(String),
    DatapointsWindow(String),
    InsertDatapoint { ts: String, timestamp: i64, value: f64 },
    AppendLogs { log_id: i64, count: usize },
}

struct MockState {
    calls: Vec<Op>,
    /// Per-endpoint queued failures, popped front on each call.
    fail_queues: HashMap<&'static str, VecDeque<ApiError>>,
    /// Status returned by every endpoint while set (supervised-restart tests).
    fail_all_status: Option<u16>,

    token: TokenInfo,
    simulators: Vec<Simulator>,
    integrations: Vec<Integration>,
    model_revisions: Vec<ModelRevision>,
    routine_revisions: Vec<RoutineRevision>,
    runs: Vec<SimulationRun>,
    run_data: HashMap<i64, RunData>,
    next_id: i64,
    download_links: HashMap<i64, String>,
    datapoints: HashMap<String, Vec<Datapoint>>,
    logs: HashMap<i64, Vec<LogEntry>>,
}

/// Programmable in-memory control plane.
///
/// Records every call and serves canned resources; tests seed it, run the
/// component under test, and assert on `calls()` plus the mutated state.
#[derive(Clone)]
pub struct MockControlPlane {
    inner: Arc<Mutex<MockState>>,
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                calls: Vec::new(),
                fail_queues: HashMap::new(),
                fail_all_status: None,
                token: TokenInfo { subject: "mock-subject".into(), projects: vec!["test".into()] },
                simulators: Vec::new(),
                integrations: Vec::new(),
                model_revisions: Vec::new(),
                routine_revisions: Vec::new(),
                runs: Vec::new(),
                run_data: HashMap::new(),
                next_id: 1,
                download_links: HashMap::new(),
                datapoints: HashMap::new(),
                logs: HashMap::new(),
            })),
        }
    }

    // ── Seeding ─────────────────────────────────────────────────────

    pub fn seed_model_revision(&self, revision: ModelRevision) {
        self.inner.lock().model_revisions.push(revision);
    }

    pub fn seed_routine_revision(&self, revision: RoutineRevision) {
        self.inner.lock().routine_revisions.push(revision);
    }

    pub fn seed_integration(&self, integration: Integration) {
        self.inner.lock().integrations.push(integration);
    }

    pub fn seed_run(&self, run: SimulationRun) {
        self.inner.lock().runs.push(run);
    }

    pub fn seed_download_link(&self, file_id: i64, url: impl Into<String>) {
        self.inner.lock().download_links.insert(file_id, url.into());
    }

    pub fn seed_datapoints(&self, ts_external_id: impl Into<String>, points: Vec<Datapoint>) {
        self.inner.lock().datapoints.insert(ts_external_id.into(), points);
    }

    // ── Failure injection ───────────────────────────────────────────

    /// Queue one failure for the named endpoint (e.g. `"update_run"`).
    pub fn fail_once(&self, endpoint: &'static str, error: ApiError) {
        self.inner.lock().fail_queues.entry(endpoint).or_default().push_back(error);
    }

    /// Make every endpoint answer with this HTTP status until cleared.
    pub fn fail_all_with_status(&self, status: u16) {
        self.inner.lock().fail_all_status = Some(status);
    }

    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock();
        inner.fail_all_status = None;
        inner.fail_queues.clear();
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<Op> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    pub fn runs(&self) -> Vec<SimulationRun> {
        self.inner.lock().runs.clone()
    }

    pub fn logs(&self, log_id: i64) -> Vec<LogEntry> {
        self.inner.lock().logs.get(&log_id).cloned().unwrap_or_default()
    }

    pub fn datapoints(&self, ts_external_id: &str) -> Vec<Datapoint> {
        self.inner.lock().datapoints.get(ts_external_id).cloned().unwrap_or_default()
    }

    /// Remote view of a model revision (parsing-status writes land here).
    pub fn model_revision(&self, external_id: &str) -> Option<ModelRevision> {
        self.inner.lock().model_revisions.iter().find(|r| r.external_id == external_id).cloned()
    }

    /// Delete a model revision remotely (eviction tests).
    pub fn remove_model_revision(&self, external_id: &str) {
        self.inner.lock().model_revisions.retain(|r| r.external_id != external_id);
    }

    /// Flip a revision's remote status, e.g. back to `unknown` to request a
    /// re-parse.
    pub fn set_model_revision_status(&self, external_id: &str, status: ParsingStatus) {
        let mut inner = self.inner.lock();
        if let Some(rev) = inner.model_revisions.iter_mut().find(|r| r.external_id == external_id)
        {
            rev.status = status;
            rev.last_updated_time += 1;
        }
    }

    fn begin(&self, endpoint: &'static str, op: Op) -> ApiResult<()> {
        let mut inner = self.inner.lock();
        inner.calls.push(op);
        if let Some(status) = inner.fail_all_status {
            return Err(ApiError::Status { status, message: "mock failure".into() });
        }
        if let Some(queue) = inner.fail_queues.get_mut(endpoint) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn token_inspect(&self) -> ApiResult<TokenInfo> {
        self.begin("token_inspect", Op::TokenInspect)?;
        Ok(self.inner.lock().token.clone())
    }

    async fn upsert_simulator(&self, simulator: SimulatorCreate) -> ApiResult<Simulator> {
        self.begin("upsert_simulator", Op::UpsertSimulator(simulator.external_id.clone()))?;
        let mut inner = self.inner.lock();
        if let Some(existing) =
            inner.simulators.iter().find(|s| s.external_id == simulator.external_id)
        {
            return Ok(existing.clone());
        }
        let id = inner.next_id;
        inner.next_id += 1;
        let created = Simulator {
            id,
            external_id: simulator.external_id,
            name: simulator.name,
            file_extension_types: simulator.file_extension_types,
        };
        inner.simulators.push(created.clone());
        Ok(created)
    }

    async fn list_simulators(&self) -> ApiResult<Vec<Simulator>> {
        self.begin("list_simulators", Op::ListSimulators)?;
        Ok(self.inner.lock().simulators.clone())
    }

    async fn list_integrations(&self, simulator_external_id: &str) -> ApiResult<Vec<Integration>> {
        self.begin("list_integrations", Op::ListIntegrations)?;
        Ok(self
            .inner
            .lock()
            .integrations
            .iter()
            .filter(|i| i.simulator_external_id == simulator_external_id)
            .cloned()
            .collect())
    }

    async fn upsert_integration(&self, create: IntegrationCreate) -> ApiResult<Integration> {
        self.begin("upsert_integration", Op::UpsertIntegration(create.external_id.clone()))?;
        let mut inner = self.inner.lock();
        if let Some(existing) =
            inner.integrations.iter().find(|i| i.external_id == create.external_id)
        {
            return Ok(existing.clone());
        }
        let id = inner.next_id;
        inner.next_id += 1;
        let log_id = inner.next_id;
        inner.next_id += 1;
        let created = Integration {
            id,
            external_id: create.external_id,
            simulator_external_id: create.simulator_external_id,
            data_set_id: create.data_set_id,
            connector_version: create.connector_version,
            simulator_version: create.simulator_version,
            heartbeat: 0,
            active: true,
            log_id: Some(log_id),
        };
        inner.integrations.push(created.clone());
        Ok(created)
    }

    async fn update_integration(&self, id: i64, update: IntegrationUpdate) -> ApiResult<()> {
        self.begin(
            "update_integration",
            Op::UpdateIntegration { id, heartbeat: update.heartbeat },
        )?;
        let mut inner = self.inner.lock();
        if let Some(integration) = inner.integrations.iter_mut().find(|i| i.id == id) {
            integration.heartbeat = update.heartbeat;
            if let Some(v) = update.connector_version {
                integration.connector_version = v;
            }
            if let Some(v) = update.simulator_version {
                integration.simulator_version = v;
            }
        }
        Ok(())
    }

    async fn upsert_extraction_pipeline(
        &self,
        create: ExtractionPipelineCreate,
    ) -> ApiResult<()> {
        self.begin(
            "upsert_extraction_pipeline",
            Op::UpsertExtractionPipeline(create.external_id),
        )?;
        Ok(())
    }

    async fn create_extraction_run(&self, item: ExtractionRunCreate) -> ApiResult<()> {
        self.begin(
            "create_extraction_run",
            Op::CreateExtractionRun { external_id: item.external_id, status: item.status },
        )?;
        Ok(())
    }

    async fn list_model_revisions(
        &self,
        filter: ModelRevisionFilter,
        cursor: Option<String>,
        limit: usize,
    ) -> ApiResult<Page<ModelRevision>> {
        self.begin("list_model_revisions", Op::ListModelRevisions)?;
        let inner = self.inner.lock();
        let matching: Vec<ModelRevision> = inner
            .model_revisions
            .iter()
            .filter(|r| {
                filter
                    .simulator_external_id
                    .as_deref()
                    .is_none_or(|sim| r.simulator_external_id == sim)
                    && filter.last_updated_after.is_none_or(|t| r.last_updated_time >= t)
            })
            .cloned()
            .collect();
        let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let items: Vec<ModelRevision> = matching.iter().skip(offset).take(limit).cloned().collect();
        let next = offset + items.len();
        let next_cursor = (next < matching.len()).then(|| next.to_string());
        Ok(Page { items, next_cursor })
    }

    async fn model_revision_by_external_id(&self, external_id: &str) -> ApiResult<ModelRevision> {
        self.begin(
            "model_revision_by_external_id",
            Op::ModelRevisionByExternalId(external_id.to_string()),
        )?;
        self.model_revision(external_id).ok_or_else(|| ApiError::NotFound {
            kind: "model revision",
            external_id: external_id.to_string(),
        })
    }

    async fn update_parsing_status(&self, revision_id: i64, state: ParsingState) -> ApiResult<()> {
        self.begin(
            "update_parsing_status",
            Op::UpdateParsingStatus { revision_id, status: state.status },
        )?;
        let mut inner = self.inner.lock();
        if let Some(rev) = inner.model_revisions.iter_mut().find(|r| r.id == revision_id) {
            rev.status = state.status;
            rev.status_message = state.status_message;
        }
        Ok(())
    }

    async fn list_routine_revisions(
        &self,
        filter: RoutineRevisionFilter,
        cursor: Option<String>,
        limit: usize,
    ) -> ApiResult<Page<RoutineRevision>> {
        self.begin("list_routine_revisions", Op::ListRoutineRevisions)?;
        let inner = self.inner.lock();
        let matching: Vec<RoutineRevision> = inner
            .routine_revisions
            .iter()
            .filter(|r| {
                filter
                    .simulator_external_id
                    .as_deref()
                    .is_none_or(|sim| r.simulator_external_id == sim)
                    && filter.created_after.is_none_or(|t| r.created_time >= t)
            })
            .cloned()
            .collect();
        let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let items: Vec<RoutineRevision> =
            matching.iter().skip(offset).take(limit).cloned().collect();
        let next = offset + items.len();
        let next_cursor = (next < matching.len()).then(|| next.to_string());
        Ok(Page { items, next_cursor })
    }

    async fn routine_revision_by_external_id(
        &self,
        external_id: &str,
    ) -> ApiResult<RoutineRevision> {
        self.begin(
            "routine_revision_by_external_id",
            Op::RoutineRevisionByExternalId(external_id.to_string()),
        )?;
        self.inner
            .lock()
            .routine_revisions
            .iter()
            .find(|r| r.external_id == external_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound {
                kind: "routine revision",
                external_id: external_id.to_string(),
            })
    }

    async fn list_runs(&self, filter: RunFilter) -> ApiResult<Vec<SimulationRun>> {
        self.begin("list_runs", Op::ListRuns)?;
        Ok(self
            .inner
            .lock()
            .runs
            .iter()
            .filter(|r| {
                filter
                    .simulator_external_id
                    .as_deref()
                    .is_none_or(|sim| r.simulator_external_id == sim)
                    && filter.status.is_none_or(|s| r.status == s)
            })
            .cloned()
            .collect())
    }

    async fn create_runs(&self, items: Vec<RunCreate>) -> ApiResult<Vec<SimulationRun>> {
        self.begin("create_runs", Op::CreateRuns(items.len()))?;
        let mut inner = self.inner.lock();
        let mut created = Vec::with_capacity(items.len());
        for item in items {
            let id = inner.next_id;
            inner.next_id += 1;
            // Resolve the latest revision of the routine, as the remote does.
            let revision = inner
                .routine_revisions
                .iter()
                .rev()
                .find(|r| r.routine_external_id == item.routine_external_id);
            let Some(revision) = revision else {
                return Err(ApiError::NotFound {
                    kind: "routine",
                    external_id: item.routine_external_id,
                });
            };
            let run = SimulationRun {
                id,
                simulator_external_id: revision.simulator_external_id.clone(),
                routine_revision_external_id: revision.external_id.clone(),
                model_revision_external_id: format!("{}-v1", revision.model_external_id),
                status: RunStatus::Ready,
                status_message: None,
                run_type: item.run_type,
                run_time: item.run_time,
                simulation_time: None,
                run_inputs: Vec::new(),
                log_id: None,
                created_time: 0,
                last_updated_time: 0,
            };
            inner.runs.push(run.clone());
            created.push(run);
        }
        Ok(created)
    }

    async fn run_by_id(&self, id: i64) -> ApiResult<SimulationRun> {
        self.begin("run_by_id", Op::RunById(id))?;
        self.inner
            .lock()
            .runs
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound { kind: "run", external_id: id.to_string() })
    }

    async fn update_run(&self, callback: RunCallback) -> ApiResult<SimulationRun> {
        self.begin("update_run", Op::UpdateRun { id: callback.id, status: callback.status })?;
        let mut inner = self.inner.lock();
        let run = inner
            .runs
            .iter_mut()
            .find(|r| r.id == callback.id)
            .ok_or_else(|| ApiError::NotFound {
                kind: "run",
                external_id: callback.id.to_string(),
            })?;
        run.status = callback.status;
        run.status_message = callback.status_message;
        if callback.simulation_time.is_some() {
            run.simulation_time = callback.simulation_time;
        }
        run.last_updated_time += 1;
        let updated = run.clone();
        if !callback.inputs.is_empty() || !callback.outputs.is_empty() {
            inner.run_data.insert(
                callback.id,
                RunData { run_id: callback.id, inputs: callback.inputs, outputs: callback.outputs },
            );
        }
        Ok(updated)
    }

    async fn list_run_data(&self, run_id: i64) -> ApiResult<RunData> {
        self.begin("list_run_data", Op::ListRunData(run_id))?;
        Ok(self
            .inner
            .lock()
            .run_data
            .get(&run_id)
            .cloned()
            .unwrap_or(RunData { run_id, inputs: Vec::new(), outputs: Vec::new() }))
    }

    async fn file_download_link(&self, file_id: i64) -> ApiResult<String> {
        self.begin("file_download_link", Op::FileDownloadLink(file_id))?;
        self.inner.lock().download_links.get(&file_id).cloned().ok_or_else(|| {
            ApiError::NotFound { kind: "file", external_id: file_id.to_string() }
        })
    }

    async fn latest_datapoint(
        &self,
        ts_external_id: &str,
        before: i64,
    ) -> ApiResult<Option<Datapoint>> {
        self.begin("latest_datapoint", Op::LatestDatapoint(ts_external_id.to_string()))?;
        Ok(self
            .inner
            .lock()
            .datapoints
            .get(ts_external_id)
            .and_then(|points| {
                points.iter().filter(|p| p.timestamp < before).max_by_key(|p| p.timestamp)
            })
            .copied())
    }

    async fn datapoints_window(
        &self,
        ts_external_id: &str,
        start: i64,
        end: i64,
    ) -> ApiResult<Vec<Datapoint>> {
        self.begin("datapoints_window", Op::DatapointsWindow(ts_external_id.to_string()))?;
        Ok(self
            .inner
            .lock()
            .datapoints
            .get(ts_external_id)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.timestamp >= start && p.timestamp <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_datapoint(&self, ts_external_id: &str, point: Datapoint) -> ApiResult<()> {
        self.begin(
            "insert_datapoint",
            Op::InsertDatapoint {
                ts: ts_external_id.to_string(),
                timestamp: point.timestamp,
                value: point.value,
            },
        )?;
        self.inner.lock().datapoints.entry(ts_external_id.to_string()).or_default().push(point);
        Ok(())
    }

    async fn append_logs(&self, log_id: i64, entries: Vec<LogEntry>) -> ApiResult<()> {
        self.begin("append_logs", Op::AppendLogs { log_id, count: entries.len() })?;
        self.inner.lock().logs.entry(log_id).or_default().extend(entries);
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_tests.rs"]
mod tests;
