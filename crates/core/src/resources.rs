// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane resource records.
//!
//! These mirror the remote API shapes (camelCase on the wire). The connector
//! never mints ids; numeric ids come from the control plane and external ids
//! from the resource owners.

use crate::severity::LogSeverity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Simulator & integration ─────────────────────────────────────────────

/// A simulator definition registered with the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Simulator {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    /// File extensions this simulator can open, e.g. `["csv", "xml"]`.
    #[serde(default)]
    pub file_extension_types: Vec<String>,
}

/// Create/upsert payload for a simulator definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorCreate {
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub file_extension_types: Vec<String>,
}

/// A connector integration identity: one remote object per running connector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: i64,
    pub external_id: String,
    pub simulator_external_id: String,
    pub data_set_id: i64,
    #[serde(default)]
    pub connector_version: String,
    #[serde(default)]
    pub simulator_version: String,
    /// Last-seen epoch ms, maintained by the heartbeat.
    #[serde(default)]
    pub heartbeat: i64,
    #[serde(default)]
    pub active: bool,
    /// Remote log resource receiving forwarded connector logs.
    #[serde(default)]
    pub log_id: Option<i64>,
}

/// Heartbeat / liveness update for an integration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationUpdate {
    /// Last-seen epoch ms.
    pub heartbeat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulator_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_last_checked: Option<i64>,
    /// Free-form extra status fields published alongside liveness.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

// ── Model revisions ─────────────────────────────────────────────────────

/// Remote parsing status of a model revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingStatus {
    /// Not yet parsed, or remotely reset to request a re-parse.
    #[default]
    Unknown,
    Success,
    Failure,
}

crate::simple_display! {
    ParsingStatus {
        Unknown => "unknown",
        Success => "success",
        Failure => "failure",
    }
}

/// Parsing-status write-back payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsingState {
    pub status: ParsingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

/// An external dependency file declared by a model revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyFile {
    pub file_id: i64,
    /// Simulator-specific arguments, e.g. `{address: test.address.1}`.
    #[serde(default)]
    pub arguments: HashMap<String, String>,
}

/// A versioned simulator model artifact known to the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelRevision {
    pub id: i64,
    pub external_id: String,
    pub model_external_id: String,
    pub simulator_external_id: String,
    pub data_set_id: i64,
    pub file_id: i64,
    pub created_time: i64,
    pub last_updated_time: i64,
    pub version_number: i32,
    #[serde(default)]
    pub log_id: Option<i64>,
    #[serde(default)]
    pub status: ParsingStatus,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub external_dependencies: Vec<DependencyFile>,
}

// ── Routine revisions ───────────────────────────────────────────────────

/// Schedule section of a routine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineSchedule {
    pub enabled: bool,
    /// 5-field cron expression, evaluated in the connector's local timezone.
    pub cron_expression: String,
}

/// Data-sampling section of a routine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingConfig {
    pub enabled: bool,
    /// Width of the sampling window, minutes.
    pub sampling_window: i64,
    /// Datapoint granularity within the window, minutes.
    #[serde(default = "default_granularity")]
    pub granularity: i64,
}

fn default_granularity() -> i64 {
    1
}

/// Logical-check section: gate sampling on a boolean time series condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalCheck {
    pub enabled: bool,
    #[serde(default)]
    pub timeseries_external_id: Option<String>,
    /// Comparison operator: `eq`, `ne`, `gt`, `ge`, `lt`, `le`.
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

/// Steady-state-detection section: require a stable window before sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SteadyStateDetection {
    pub enabled: bool,
    #[serde(default)]
    pub timeseries_external_id: Option<String>,
    #[serde(default)]
    pub min_section_size: i64,
    #[serde(default)]
    pub var_threshold: f64,
    #[serde(default)]
    pub slope_threshold: f64,
}

/// A scalar routine value: numeric or string on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Double(f64),
    String(String),
}

impl InputValue {
    /// Coerce to f64; string inputs parse when the routine expects numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            InputValue::Double(v) => Some(*v),
            InputValue::String(s) => s.trim().parse().ok(),
        }
    }
}

/// One declared routine input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineInput {
    pub reference_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Constant value; mutually exclusive with a time-series source.
    #[serde(default)]
    pub value: Option<InputValue>,
    #[serde(default)]
    pub unit: Option<String>,
    /// Sample this series over the sampling window instead of a constant.
    #[serde(default)]
    pub source_external_id: Option<String>,
    /// Optionally persist the resolved input value to this series.
    #[serde(default)]
    pub save_timeseries_external_id: Option<String>,
}

/// One declared routine output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineOutput {
    pub reference_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    /// Optionally persist the simulated value to this series.
    #[serde(default)]
    pub save_timeseries_external_id: Option<String>,
}

/// Declarative configuration of a routine revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineConfig {
    #[serde(default)]
    pub inputs: Vec<RoutineInput>,
    #[serde(default)]
    pub outputs: Vec<RoutineOutput>,
    #[serde(default)]
    pub schedule: Option<RoutineSchedule>,
    #[serde(default)]
    pub data_sampling: Option<SamplingConfig>,
    #[serde(default)]
    pub logical_check: Option<LogicalCheck>,
    #[serde(default)]
    pub steady_state_detection: Option<SteadyStateDetection>,
    /// Minimum severity forwarded to the remote log for runs of this routine.
    #[serde(default)]
    pub log_level: Option<LogSeverity>,
}

/// A versioned, declarative description of a simulation routine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutineRevision {
    pub id: i64,
    pub external_id: String,
    pub routine_external_id: String,
    pub simulator_external_id: String,
    pub model_external_id: String,
    pub data_set_id: i64,
    pub created_time: i64,
    pub configuration: RoutineConfig,
    /// Simulator-specific command stages, passed opaquely to the driver.
    #[serde(default)]
    pub script: serde_json::Value,
}

// ── Simulation runs ─────────────────────────────────────────────────────

/// Remote status of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ready,
    Running,
    Success,
    Failure,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failure)
    }
}

crate::simple_display! {
    RunStatus {
        Ready => "ready",
        Running => "running",
        Success => "success",
        Failure => "failure",
    }
}

/// How a run came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    External,
    Scheduled,
    Manual,
}

crate::simple_display! {
    RunType {
        External => "external",
        Scheduled => "scheduled",
        Manual => "manual",
    }
}

/// A user-provided input override, matched to an input by reference id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInputOverride {
    pub reference_id: String,
    pub value: InputValue,
    #[serde(default)]
    pub unit: Option<String>,
}

/// One instance of executing a routine revision against a model revision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRun {
    pub id: i64,
    pub simulator_external_id: String,
    pub routine_revision_external_id: String,
    pub model_revision_external_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub status_message: Option<String>,
    pub run_type: RunType,
    /// Requested simulation time (epoch ms); stamped by the scheduler for
    /// scheduled runs.
    #[serde(default)]
    pub run_time: Option<i64>,
    #[serde(default)]
    pub simulation_time: Option<i64>,
    #[serde(default)]
    pub run_inputs: Vec<RunInputOverride>,
    #[serde(default)]
    pub log_id: Option<i64>,
    pub created_time: i64,
    pub last_updated_time: i64,
}

/// Create payload for a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunCreate {
    pub routine_external_id: String,
    pub run_type: RunType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_time: Option<i64>,
}

/// A resolved input or output value reported back with a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunValueItem {
    pub reference_id: String,
    pub value: InputValue,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub timeseries_external_id: Option<String>,
    /// Set when a user override replaced the routine-declared value.
    #[serde(default)]
    pub overridden: Option<bool>,
}

/// Status callback for a claimed run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunCallback {
    pub id: i64,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<RunValueItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<RunValueItem>,
}

// ── Logs & datapoints ───────────────────────────────────────────────────

/// A structured log record forwarded to the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: i64,
    pub severity: LogSeverity,
    pub message: String,
}

/// One time-series datapoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datapoint {
    pub timestamp: i64,
    pub value: f64,
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod tests;
