// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic liveness publishing for the connector integration.

use futures_util::future::{BoxFuture, FutureExt};
use sim_client::{ControlPlane, ExtractionRunCreate, ExtractionRunStatus};
use sim_core::{Clock, ConnectorError, IntegrationUpdate};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Heartbeat settings.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// `connector.statusInterval` seconds.
    pub interval: Duration,
    pub connector_version: String,
    pub simulator_version: String,
    /// Extra status fields published with every beat.
    pub extra: HashMap<String, String>,
    /// Extraction pipeline to report `seen` runs against, when registered.
    pub extraction_pipeline: Option<String>,
}

/// Publishes `{lastSeen, versions, extra}` to the integration on a fixed
/// interval. No backoff: a failed beat logs and waits for the next tick,
/// unless the failure demands a supervised restart.
pub struct Heartbeat<C: Clock> {
    client: Arc<dyn ControlPlane>,
    clock: C,
    integration_id: i64,
    config: HeartbeatConfig,
}

impl<C: Clock> Heartbeat<C> {
    pub fn new(
        client: Arc<dyn ControlPlane>,
        clock: C,
        integration_id: i64,
        config: HeartbeatConfig,
    ) -> Self {
        Self { client, clock, integration_id, config }
    }

    pub fn run_tasks(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Vec<BoxFuture<'static, Result<(), ConnectorError>>> {
        let this = Arc::clone(self);
        vec![async move { this.beat_loop(cancel).await }.boxed()]
    }

    async fn beat_loop(self: Arc<Self>, cancel: CancellationToken) -> Result<(), ConnectorError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match self.beat_once().await {
                Ok(()) => debug!(integration = self.integration_id, "heartbeat published"),
                Err(err) if err.kind().restarts_group() => {
                    error!(error = %err, "heartbeat failed fatally");
                    return Err(err);
                }
                Err(err) => warn!(error = %err, "heartbeat failed"),
            }
            tokio::select! {
                _ = self.clock.sleep(self.config.interval) => {}
                _ = cancel.cancelled() => return Ok(()),
            }
        }
    }

    /// One liveness update.
    pub async fn beat_once(&self) -> Result<(), ConnectorError> {
        let update = IntegrationUpdate {
            heartbeat: self.clock.epoch_ms() as i64,
            connector_version: Some(self.config.connector_version.clone()),
            simulator_version: Some(self.config.simulator_version.clone()),
            license_last_checked: None,
            extra: self.config.extra.clone(),
        };
        self.client
            .update_integration(self.integration_id, update)
            .await
            .map_err(ConnectorError::from)?;

        // Extraction-pipeline liveness rides along; its failure is not a
        // heartbeat failure.
        if let Some(pipeline) = &self.config.extraction_pipeline {
            let report = ExtractionRunCreate {
                external_id: pipeline.clone(),
                status: ExtractionRunStatus::Seen,
                message: None,
            };
            if let Err(err) = self.client.create_extraction_run(report).await {
                warn!(pipeline = %pipeline, error = %err, "extraction run report failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
