// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A simulator driver with no simulator behind it.
//!
//! Used by the stock `simconnd` binary to exercise a full connector
//! deployment (identities, libraries, runs, logs) before a real engine
//! driver is linked in. Models "parse" when their primary file exists;
//! routines "run" by echoing the numeric input sum into every declared
//! output.

use crate::driver::{
    AutomationConfig, DriverError, ModelFiles, ModelInfo, SimulatorDriver,
};
use async_trait::async_trait;
use sim_core::{RoutineRevision, RunValueItem};
use std::collections::HashMap;

/// Stand-in engine for end-to-end deployment checks.
#[derive(Debug, Clone, Default)]
pub struct EmptySimulator;

impl EmptySimulator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SimulatorDriver for EmptySimulator {
    async fn initialize(&self, _config: &AutomationConfig) -> Result<(), DriverError> {
        Ok(())
    }

    fn simulator_version(&self) -> String {
        format!("empty-simulator {}", env!("CARGO_PKG_VERSION"))
    }

    async fn extract_model_information(
        &self,
        model: &ModelFiles,
    ) -> Result<ModelInfo, DriverError> {
        if !model.primary_path.exists() {
            return Err(DriverError::ParseFailure(format!(
                "model file {} does not exist",
                model.primary_path.display()
            )));
        }
        let addresses = model
            .dependencies
            .iter()
            .filter_map(|d| d.arguments.get("address").cloned())
            .collect();
        Ok(ModelInfo { model_version: None, addresses })
    }

    async fn run_simulation(
        &self,
        _model: &ModelFiles,
        revision: &RoutineRevision,
        inputs: &[RunValueItem],
    ) -> Result<HashMap<String, f64>, DriverError> {
        let sum: f64 = inputs.iter().filter_map(|i| i.value.as_f64()).sum();
        Ok(revision
            .configuration
            .outputs
            .iter()
            .map(|o| (o.reference_id.clone(), sum))
            .collect())
    }
}

#[cfg(test)]
#[path = "empty_tests.rs"]
mod tests;
