// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root and supervision loop.
//!
//! One supervised cycle: probe the control plane, register the simulator
//! and integration identities, wire the libraries and engine, then run
//! every background activity until one fails fatally or the root token
//! cancels. A fatal failure cancels the group, drains it within the
//! configured timeout, and restarts the whole cycle after a fixed delay.

use crate::config::ConnectorConfig;
use crate::CONNECTOR_VERSION;
use sim_client::{ControlPlane, ExtractionPipelineCreate, IntegrationCreate};
use sim_core::{Clock, ConnectorError, LogSeverity, SimulatorCreate};
use sim_driver::SimulatorDriver;
use sim_engine::{
    Heartbeat, HeartbeatConfig, RemoteLogSink, Runner, RunnerConfig, Scheduler, SchedulerConfig,
};
use sim_library::{
    FileFetcher, ModelLibrary, ModelLibraryConfig, RoutineLibrary, RoutineLibraryConfig,
};
use sim_storage::StateStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The connector process: composition plus restart-on-fault supervision.
pub struct ConnectorRuntime<C: Clock> {
    config: ConnectorConfig,
    client: Arc<dyn ControlPlane>,
    driver: Arc<dyn SimulatorDriver>,
    fetcher: Arc<dyn FileFetcher>,
    clock: C,
    restarts: AtomicU32,
}

impl<C: Clock> ConnectorRuntime<C> {
    pub fn new(
        config: ConnectorConfig,
        client: Arc<dyn ControlPlane>,
        driver: Arc<dyn SimulatorDriver>,
        fetcher: Arc<dyn FileFetcher>,
        clock: C,
    ) -> Self {
        Self { config, client, driver, fetcher, clock, restarts: AtomicU32::new(0) }
    }

    /// Number of supervised restarts so far.
    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }

    /// Run until the root token cancels. Fatal group failures restart the
    /// supervised cycle after the configured delay.
    pub async fn run(&self, root: CancellationToken) -> Result<(), ConnectorError> {
        loop {
            if root.is_cancelled() {
                return Ok(());
            }
            match self.run_supervised(&root).await {
                Ok(()) => {
                    info!("Connector stopped");
                    return Ok(());
                }
                Err(err) => {
                    error!("{err}");
                    self.restarts.fetch_add(1, Ordering::SeqCst);
                    let delay = self.config.restart_delay();
                    info!("Restarting connector in {} seconds", delay.as_secs());
                    tokio::select! {
                        _ = self.clock.sleep(delay) => {}
                        _ = root.cancelled() => return Ok(()),
                    }
                }
            }
        }
    }

    /// One supervised cycle. Returns `Ok` only on root cancellation.
    async fn run_supervised(&self, root: &CancellationToken) -> Result<(), ConnectorError> {
        let group = root.child_token();
        let result = self.start_group(&group).await;
        group.cancel();
        if let Err(err) = self.driver.pre_shutdown().await {
            warn!(error = %err, "simulator pre-shutdown hook failed");
        }
        result
    }

    async fn start_group(&self, group: &CancellationToken) -> Result<(), ConnectorError> {
        // 1. Probe the control plane: token and project reachability.
        let token = self.client.token_inspect().await.map_err(ConnectorError::from)?;
        let project = &self.config.cognite.project;
        if !project.is_empty()
            && !token.projects.is_empty()
            && !token.projects.contains(project)
        {
            warn!(project, subject = %token.subject, "token does not list the configured project");
        }

        // 2. Connect the simulator driver.
        self.driver
            .initialize(&self.config.automation)
            .await
            .map_err(ConnectorError::from)?;
        let simulator_version = self.driver.simulator_version();

        // 3. Register identities.
        let simulator = self
            .client
            .upsert_simulator(SimulatorCreate {
                external_id: self.config.simulator.external_id.clone(),
                name: self.config.simulator.name.clone(),
                file_extension_types: self.config.simulator.file_extension_types.clone(),
            })
            .await
            .map_err(ConnectorError::from)?;
        let integration = self
            .client
            .upsert_integration(IntegrationCreate {
                external_id: self.config.integration_external_id(),
                simulator_external_id: simulator.external_id.clone(),
                data_set_id: self.config.connector.data_set_id,
                connector_version: CONNECTOR_VERSION.to_string(),
                simulator_version: simulator_version.clone(),
            })
            .await
            .map_err(ConnectorError::from)?;
        if let Err(err) = self
            .client
            .upsert_extraction_pipeline(ExtractionPipelineCreate {
                external_id: integration.external_id.clone(),
                name: format!("{} simulator connector", simulator.name),
                data_set_id: self.config.connector.data_set_id,
            })
            .await
        {
            warn!(error = %err, "extraction pipeline upsert failed");
        }
        info!(
            integration = %integration.external_id,
            simulator = %simulator.external_id,
            "connector identities registered"
        );

        // 4. State store and libraries.
        let store = Arc::new(StateStore::new(&self.config.model_library.state_store_file));
        if let Err(err) = store.load() {
            // A fresh store is better than refusing to start.
            warn!(error = %err, "state store unreadable, starting empty");
        }
        let models = Arc::new(ModelLibrary::new(
            Arc::clone(&self.client),
            Arc::clone(&self.driver),
            Arc::clone(&self.fetcher),
            Arc::clone(&store),
            self.clock.clone(),
            simulator.external_id.clone(),
            ModelLibraryConfig {
                files_directory: self.config.model_library.files_directory.clone(),
                library_update_interval: Duration::from_secs(
                    self.config.model_library.library_update_interval,
                ),
                state_flush_interval: Duration::from_secs(
                    self.config.model_library.state_flush_interval,
                ),
                pagination_limit: self.config.model_library.pagination_limit,
                max_download_attempts: self.config.model_library.max_download_attempts,
            },
        ));
        models.init()?;
        let routines = Arc::new(RoutineLibrary::new(
            Arc::clone(&self.client),
            Arc::clone(&store),
            self.clock.clone(),
            simulator.external_id.clone(),
            RoutineLibraryConfig {
                library_update_interval: Duration::from_secs(
                    self.config.routine_library.library_update_interval,
                ),
                pagination_limit: self.config.routine_library.pagination_limit,
            },
        ));
        routines.init(group).await?;

        // 5. Engine components.
        let sink = Arc::new(RemoteLogSink::new(
            Arc::clone(&self.client),
            self.config.logger.remote.enabled,
            LogSeverity::parse(&self.config.logger.remote.level)
                .unwrap_or(LogSeverity::Information),
        ));
        let heartbeat = Arc::new(Heartbeat::new(
            Arc::clone(&self.client),
            self.clock.clone(),
            integration.id,
            HeartbeatConfig {
                interval: self.config.status_interval(),
                connector_version: CONNECTOR_VERSION.to_string(),
                simulator_version,
                extra: HashMap::new(),
                extraction_pipeline: Some(integration.external_id.clone()),
            },
        ));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&self.client),
            Arc::clone(&routines),
            self.clock.clone(),
            SchedulerConfig {
                update_interval: Duration::from_secs(self.config.scheduler.update_interval),
            },
        ));
        let runner = Arc::new(Runner::new(
            Arc::clone(&self.client),
            Arc::clone(&self.driver),
            Arc::clone(&models),
            Arc::clone(&routines),
            Arc::clone(&sink),
            self.clock.clone(),
            simulator.external_id.clone(),
            RunnerConfig {
                poll_interval: Duration::from_secs(self.config.runner.poll_interval),
                max_concurrent_runs: self.config.runner.max_concurrent_runs,
                run_timeout: Duration::from_secs(self.config.runner.run_timeout_seconds),
            },
        ));

        // 6. Start everything under one group token.
        let mut set: JoinSet<Result<(), ConnectorError>> = JoinSet::new();
        let tasks = heartbeat
            .run_tasks(group.clone())
            .into_iter()
            .chain(scheduler.run_tasks(group.clone()))
            .chain(models.run_tasks(group.clone()))
            .chain(routines.run_tasks(group.clone()))
            .chain(runner.run_tasks(group.clone()))
            .chain(sink.run_tasks(
                self.clock.clone(),
                Duration::from_secs(self.config.logger.remote.flush_interval),
                group.clone(),
            ));
        for task in tasks {
            set.spawn(task);
        }
        info!(activities = set.len(), "connector started");

        // 7. Supervise: first fatal error wins; root cancel stops cleanly.
        let result = loop {
            tokio::select! {
                joined = set.join_next() => match joined {
                    None => break Ok(()),
                    Some(Ok(Ok(()))) => continue,
                    Some(Ok(Err(err))) => break Err(err),
                    Some(Err(join_err)) => {
                        break Err(ConnectorError::internal(format!(
                            "supervised task panicked: {join_err}"
                        )))
                    }
                },
                _ = group.cancelled() => break Ok(()),
            }
        };

        // 8. Drain within the configured timeout, then flush what's left.
        group.cancel();
        let drained = tokio::time::timeout(self.config.drain_timeout(), async {
            while set.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("drain timeout elapsed with activities still running");
            set.abort_all();
        }
        sink.flush().await;
        if let Err(err) = store.flush() {
            warn!(error = %err, "final state flush failed");
        }
        result
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
