// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake simulator for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::driver::{
    AutomationConfig, DriverError, ModelFiles, ModelInfo, SimulatorDriver,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use sim_core::{RoutineRevision, RunValueItem};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Recorded call to FakeSimulator
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Initialize,
    Extract { revision_external_id: String },
    Run { revision_external_id: String, input_count: usize },
    PreShutdown,
}

struct FakeState {
    calls: Vec<DriverCall>,
    extract_failures: HashMap<String, DriverError>,
    run_failure: Option<DriverError>,
    outputs: HashMap<String, f64>,
    run_delay: Option<Duration>,
    version: String,
}

/// Scripted simulator driver.
///
/// Extraction succeeds by default; individual revisions can be failed by
/// external id, run outputs and failures are programmable, and every call is
/// recorded for assertions.
#[derive(Clone)]
pub struct FakeSimulator {
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSimulator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                calls: Vec::new(),
                extract_failures: HashMap::new(),
                run_failure: None,
                outputs: HashMap::from([("out1".to_string(), 142.0)]),
                run_delay: None,
                version: "fake-sim 1.0".to_string(),
            })),
        }
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.inner.lock().calls.clone()
    }

    pub fn extract_count(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, DriverCall::Extract { .. }))
            .count()
    }

    /// Fail extraction for one revision external id.
    pub fn fail_extract(&self, revision_external_id: impl Into<String>, error: DriverError) {
        self.inner.lock().extract_failures.insert(revision_external_id.into(), error);
    }

    pub fn clear_extract_failure(&self, revision_external_id: &str) {
        self.inner.lock().extract_failures.remove(revision_external_id);
    }

    /// Outputs returned by every subsequent `run_simulation`.
    pub fn set_outputs(&self, outputs: HashMap<String, f64>) {
        self.inner.lock().outputs = outputs;
    }

    pub fn fail_runs(&self, error: DriverError) {
        self.inner.lock().run_failure = Some(error);
    }

    /// Make each simulation take this long (timeout tests).
    pub fn set_run_delay(&self, delay: Duration) {
        self.inner.lock().run_delay = Some(delay);
    }
}

#[async_trait]
impl SimulatorDriver for FakeSimulator {
    async fn initialize(&self, _config: &AutomationConfig) -> Result<(), DriverError> {
        self.inner.lock().calls.push(DriverCall::Initialize);
        Ok(())
    }

    fn simulator_version(&self) -> String {
        self.inner.lock().version.clone()
    }

    async fn extract_model_information(
        &self,
        model: &ModelFiles,
    ) -> Result<ModelInfo, DriverError> {
        let failure = {
            let mut inner = self.inner.lock();
            inner.calls.push(DriverCall::Extract {
                revision_external_id: model.revision_external_id.clone(),
            });
            inner.extract_failures.get(&model.revision_external_id).cloned()
        };
        if let Some(err) = failure {
            return Err(err);
        }
        let addresses = model
            .dependencies
            .iter()
            .filter_map(|d| d.arguments.get("address").cloned())
            .collect();
        Ok(ModelInfo { model_version: Some("1".into()), addresses })
    }

    async fn run_simulation(
        &self,
        _model: &ModelFiles,
        revision: &RoutineRevision,
        inputs: &[RunValueItem],
    ) -> Result<HashMap<String, f64>, DriverError> {
        let (failure, outputs, delay) = {
            let mut inner = self.inner.lock();
            inner.calls.push(DriverCall::Run {
                revision_external_id: revision.external_id.clone(),
                input_count: inputs.len(),
            });
            (inner.run_failure.clone(), inner.outputs.clone(), inner.run_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(outputs)
    }

    async fn pre_shutdown(&self) -> Result<(), DriverError> {
        self.inner.lock().calls.push(DriverCall::PreShutdown);
        Ok(())
    }
}
