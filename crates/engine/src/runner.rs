// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claims ready simulation runs and drives them to a terminal status.
//!
//! Per run, strictly sequential: claim → resolve revisions → sampling →
//! inputs → simulate → outputs → terminal callback → log flush. Across
//! runs, parallel up to the configured cap, each with a cancellation scope
//! derived from the runtime root. A connector-wide failure releases the run
//! back to `ready`; only per-run problems mark it `failure`.

use crate::log_sink::RemoteLogSink;
use crate::sampling::{self, SamplingWindow};
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use sim_client::{ControlPlane, RunFilter};
use sim_core::{
    Clock, ConnectorError, ErrorKind, InputValue, LogSeverity, RoutineRevision, RunCallback,
    RunStatus, RunValueItem, SimulationRun,
};
use sim_driver::SimulatorDriver;
use sim_library::{LocalModelState, ModelLibrary, RoutineLibrary};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runner settings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How often to look for ready runs.
    pub poll_interval: Duration,
    pub max_concurrent_runs: usize,
    /// Overall deadline per simulation.
    pub run_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_concurrent_runs: 4,
            run_timeout: Duration::from_secs(600),
        }
    }
}

/// Why a run could not be carried to a terminal status locally.
enum RunAbort {
    /// Per-run problem: report `failure` with this user-visible message.
    Fail(String),
    /// Connector-wide problem: release the run back to `ready`.
    Release(ConnectorError),
}

impl From<ConnectorError> for RunAbort {
    fn from(err: ConnectorError) -> Self {
        match err.kind() {
            ErrorKind::NetworkTransient
            | ErrorKind::NetworkAuth
            | ErrorKind::ControlPlaneGone
            | ErrorKind::Cancelled => RunAbort::Release(err),
            _ => RunAbort::Fail(err.message),
        }
    }
}

/// Claims and executes simulation runs.
pub struct Runner<C: Clock> {
    client: Arc<dyn ControlPlane>,
    driver: Arc<dyn SimulatorDriver>,
    models: Arc<ModelLibrary<C>>,
    routines: Arc<RoutineLibrary<C>>,
    sink: Arc<RemoteLogSink>,
    clock: C,
    config: RunnerConfig,
    simulator_external_id: String,
    permits: Arc<Semaphore>,
    /// Runs currently executing, so a poll tick never claims twice.
    in_flight: Mutex<HashSet<i64>>,
}

impl<C: Clock> Runner<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn ControlPlane>,
        driver: Arc<dyn SimulatorDriver>,
        models: Arc<ModelLibrary<C>>,
        routines: Arc<RoutineLibrary<C>>,
        sink: Arc<RemoteLogSink>,
        clock: C,
        simulator_external_id: impl Into<String>,
        config: RunnerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_runs.max(1)));
        Self {
            client,
            driver,
            models,
            routines,
            sink,
            clock,
            config,
            simulator_external_id: simulator_external_id.into(),
            permits,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn run_tasks(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Vec<BoxFuture<'static, Result<(), ConnectorError>>> {
        let this = Arc::clone(self);
        vec![async move { this.claim_loop(cancel).await }.boxed()]
    }

    async fn claim_loop(self: Arc<Self>, cancel: CancellationToken) -> Result<(), ConnectorError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match self.poll_ready(&cancel).await {
                Ok(()) => {}
                Err(err) if err.kind().restarts_group() => {
                    error!(error = %err, "run polling failed fatally");
                    return Err(err);
                }
                Err(err) => warn!(error = %err, "run polling failed, will retry"),
            }
            tokio::select! {
                _ = self.clock.sleep(self.config.poll_interval) => {}
                _ = cancel.cancelled() => return Ok(()),
            }
        }
    }

    /// One claim pass: list ready runs for this simulator and spawn an
    /// executor per run, bounded by the concurrency cap.
    pub async fn poll_ready(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectorError> {
        let filter = RunFilter {
            simulator_external_id: Some(self.simulator_external_id.clone()),
            status: Some(RunStatus::Ready),
        };
        let ready = self.client.list_runs(filter).await.map_err(ConnectorError::from)?;

        for run in ready {
            {
                let mut in_flight = self.in_flight.lock();
                if !in_flight.insert(run.id) {
                    continue;
                }
            }
            let this = Arc::clone(self);
            let run_cancel = cancel.child_token();
            tokio::spawn(async move {
                let permit = tokio::select! {
                    permit = this.permits.clone().acquire_owned() => permit,
                    _ = run_cancel.cancelled() => {
                        this.in_flight.lock().remove(&run.id);
                        return;
                    }
                };
                let run_id = run.id;
                if permit.is_ok() {
                    this.execute_run(run, &run_cancel).await;
                }
                this.in_flight.lock().remove(&run_id);
            });
        }
        Ok(())
    }

    /// Drive one claimed run to a terminal status.
    pub async fn execute_run(&self, run: SimulationRun, cancel: &CancellationToken) {
        let run_id = run.id;
        let now = || self.clock.epoch_ms() as i64;
        info!(run_id, run_type = %run.run_type, "claiming run");

        // Claim: ready → running. Transient failures proceed anyway; the
        // terminal update consolidates status.
        let claim = RunCallback {
            id: run_id,
            status: RunStatus::Running,
            status_message: None,
            simulation_time: None,
            inputs: vec![],
            outputs: vec![],
        };
        if let Err(err) = self.client.update_run(claim).await {
            if ConnectorError::from(err.clone()).kind() == ErrorKind::NetworkTransient {
                warn!(run_id, error = %err, "claim update failed transiently, continuing");
            } else {
                warn!(run_id, error = %err, "claim failed, releasing run");
                self.release_run(run_id).await;
                return;
            }
        }

        let outcome = self.execute_claimed(&run, cancel).await;
        match outcome {
            Ok((simulation_time, inputs, outputs)) => {
                self.sink.log(run_id, LogSeverity::Information, "simulation succeeded", now());
                self.finish(
                    RunCallback {
                        id: run_id,
                        status: RunStatus::Success,
                        status_message: None,
                        simulation_time: Some(simulation_time),
                        inputs,
                        outputs,
                    },
                )
                .await;
            }
            Err(RunAbort::Fail(message)) => {
                warn!(run_id, message = %message, "run failed");
                self.sink.log(run_id, LogSeverity::Error, message.clone(), now());
                self.finish(RunCallback {
                    id: run_id,
                    status: RunStatus::Failure,
                    status_message: Some(message),
                    simulation_time: None,
                    inputs: vec![],
                    outputs: vec![],
                })
                .await;
            }
            Err(RunAbort::Release(err)) => {
                warn!(run_id, error = %err, "connector-side failure, releasing run");
                self.release_run(run_id).await;
            }
        }
        self.sink.end_scope(run_id).await;
    }

    /// The sequential body of a claimed run.
    async fn execute_claimed(
        &self,
        run: &SimulationRun,
        cancel: &CancellationToken,
    ) -> Result<(i64, Vec<RunValueItem>, Vec<RunValueItem>), RunAbort> {
        let run_id = run.id;
        let now = || self.clock.epoch_ms() as i64;

        // Routine revision first: it decides the log filter for this run.
        let revision = self
            .routines
            .routine_revision(&run.routine_revision_external_id, cancel)
            .await
            .map_err(RunAbort::from)?;
        self.sink.begin_scope(run_id, run.log_id, revision.configuration.log_level);
        self.sink.log(run_id, LogSeverity::Information, "run claimed", now());

        // Model revision; may block while the library materializes it.
        let model = self
            .models
            .model_revision(&run.model_revision_external_id, cancel)
            .await
            .map_err(RunAbort::from)?;
        let model_files = ready_model_files(&model).map_err(RunAbort::Fail)?;

        // Sampling range, when the routine asks for it.
        let has_sampling =
            revision.configuration.data_sampling.as_ref().is_some_and(|s| s.enabled);
        let validation_end = run.run_time.unwrap_or_else(now);
        let window = if has_sampling {
            let window =
                sampling::sampling_window(&*self.client, &revision.configuration, validation_end)
                    .await
                    .map_err(|err| match err {
                        sampling::SamplingError::Api(api) => {
                            RunAbort::from(ConnectorError::from(api))
                        }
                        other => RunAbort::Fail(other.to_string()),
                    })?;
            self.sink.log(
                run_id,
                LogSeverity::Debug,
                format!("sampling window [{}, {}]", window.start, window.end),
                now(),
            );
            Some(window)
        } else {
            None
        };
        let simulation_time = window.map(|w| w.calculation_time).unwrap_or(validation_end);

        // Assemble inputs: constants, sampled series, user overrides.
        let inputs = self.resolve_inputs(run, &revision, window, simulation_time).await?;
        for input in &inputs {
            if let Some(series) = &input.timeseries_external_id {
                if let Some(value) = input.value.as_f64() {
                    self.save_datapoint(series, simulation_time, value).await;
                }
            }
        }

        // Simulate, bounded by the run timeout.
        let outputs_by_ref = tokio::select! {
            result = tokio::time::timeout(
                self.config.run_timeout,
                self.driver.run_simulation(&model_files, &revision, &inputs),
            ) => match result {
                Ok(Ok(outputs)) => outputs,
                Ok(Err(err)) => return Err(RunAbort::Fail(err.to_string())),
                Err(_) => {
                    return Err(RunAbort::Fail(format!(
                        "simulation timed out after {}s",
                        self.config.run_timeout.as_secs()
                    )))
                }
            },
            _ = cancel.cancelled() => {
                return Err(RunAbort::Release(ConnectorError::cancelled()))
            }
        };

        // Persist declared outputs.
        let mut outputs = Vec::with_capacity(revision.configuration.outputs.len());
        for declared in &revision.configuration.outputs {
            let Some(value) = outputs_by_ref.get(&declared.reference_id).copied() else {
                return Err(RunAbort::Fail(format!(
                    "simulator returned no value for output {}",
                    declared.reference_id
                )));
            };
            if let Some(series) = &declared.save_timeseries_external_id {
                self.save_datapoint(series, simulation_time, value).await;
            }
            outputs.push(RunValueItem {
                reference_id: declared.reference_id.clone(),
                value: InputValue::Double(value),
                unit: declared.unit.clone(),
                timeseries_external_id: declared.save_timeseries_external_id.clone(),
                overridden: None,
            });
        }

        Ok((simulation_time, inputs, outputs))
    }

    /// Resolve every declared input, applying user overrides by reference id.
    async fn resolve_inputs(
        &self,
        run: &SimulationRun,
        revision: &RoutineRevision,
        window: Option<SamplingWindow>,
        simulation_time: i64,
    ) -> Result<Vec<RunValueItem>, RunAbort> {
        let overrides: HashMap<&str, &sim_core::RunInputOverride> =
            run.run_inputs.iter().map(|o| (o.reference_id.as_str(), o)).collect();

        let mut resolved = Vec::with_capacity(revision.configuration.inputs.len());
        for input in &revision.configuration.inputs {
            let reference_id = input.reference_id.as_str();

            if let Some(user) = overrides.get(reference_id) {
                resolved.push(RunValueItem {
                    reference_id: input.reference_id.clone(),
                    value: coerce(&user.value, reference_id)?,
                    unit: user.unit.clone().or_else(|| input.unit.clone()),
                    timeseries_external_id: input.save_timeseries_external_id.clone(),
                    overridden: Some(true),
                });
                continue;
            }

            let value = if let Some(series) = &input.source_external_id {
                self.sample_series(series, window, simulation_time).await?
            } else if let Some(constant) = &input.value {
                coerce(constant, reference_id)?
            } else {
                return Err(RunAbort::Fail(format!(
                    "input {reference_id} has neither a value nor a source time series"
                )));
            };

            resolved.push(RunValueItem {
                reference_id: input.reference_id.clone(),
                value,
                unit: input.unit.clone(),
                timeseries_external_id: input.save_timeseries_external_id.clone(),
                overridden: None,
            });
        }
        Ok(resolved)
    }

    /// Sample one input series: the window average when sampling is on,
    /// else the latest datapoint before the simulation time.
    async fn sample_series(
        &self,
        series: &str,
        window: Option<SamplingWindow>,
        simulation_time: i64,
    ) -> Result<InputValue, RunAbort> {
        let value = match window {
            Some(window) => {
                let points = self
                    .client
                    .datapoints_window(series, window.start, window.end)
                    .await
                    .map_err(|e| RunAbort::from(ConnectorError::from(e)))?;
                if points.is_empty() {
                    return Err(RunAbort::Fail(format!(
                        "no datapoints in sampling window for {series}"
                    )));
                }
                points.iter().map(|p| p.value).sum::<f64>() / points.len() as f64
            }
            None => self
                .client
                .latest_datapoint(series, simulation_time + 1)
                .await
                .map_err(|e| RunAbort::from(ConnectorError::from(e)))?
                .ok_or_else(|| RunAbort::Fail(format!("no datapoint available for {series}")))?
                .value,
        };
        Ok(InputValue::Double(value))
    }

    async fn save_datapoint(&self, series: &str, timestamp: i64, value: f64) {
        let point = sim_core::Datapoint { timestamp, value };
        if let Err(err) = self.client.insert_datapoint(series, point).await {
            warn!(series, error = %err, "failed to persist datapoint");
        }
    }

    /// Put a run back to `ready` after a connector-side failure. Best
    /// effort: if this also fails, the remote reconciler will notice the
    /// stuck `running` through heartbeat absence.
    async fn release_run(&self, run_id: i64) {
        let release = RunCallback {
            id: run_id,
            status: RunStatus::Ready,
            status_message: Some("released by connector".into()),
            simulation_time: None,
            inputs: vec![],
            outputs: vec![],
        };
        if let Err(err) = self.client.update_run(release).await {
            warn!(run_id, error = %err, "failed to release run");
        }
    }

    /// Publish a terminal status. Failures log only; the run stays
    /// consistent on the next reconciliation.
    async fn finish(&self, callback: RunCallback) {
        let run_id = callback.id;
        let status = callback.status;
        match self.client.update_run(callback).await {
            Ok(_) => debug!(run_id, status = %status, "run finished"),
            Err(err) => warn!(run_id, error = %err, "terminal update failed"),
        }
    }
}

/// The driver-facing model shape; a claimed run needs a parsed model.
fn ready_model_files(model: &LocalModelState) -> Result<sim_driver::ModelFiles, String> {
    if !model.can_read {
        return Err(format!(
            "model revision {} is unreadable: {}",
            model.revision.external_id,
            model.parsing_info.message.clone().unwrap_or_else(|| "parse failed".into())
        ));
    }
    if !model.parsing_info.parsed {
        return Err(format!("model revision {} is not parsed yet", model.revision.external_id));
    }
    model
        .model_files()
        .ok_or_else(|| format!("model revision {} has no local file", model.revision.external_id))
}

/// Coerce an override or constant to the numeric form the routine expects;
/// strings must parse to 64-bit floats.
fn coerce(value: &InputValue, reference_id: &str) -> Result<InputValue, RunAbort> {
    match value {
        InputValue::Double(v) => Ok(InputValue::Double(*v)),
        InputValue::String(s) => match value.as_f64() {
            Some(v) => Ok(InputValue::Double(v)),
            None => Err(RunAbort::Fail(format!(
                "input {reference_id} value {s:?} is not numeric"
            ))),
        },
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
