// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory catalog of routine revisions.
//!
//! No file materialization: routine configuration is embedded in the remote
//! record. The background poll advances a persisted extraction window so an
//! unchanged routine is never re-downloaded, and restarts resume where the
//! previous run's window ended.

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use sim_client::{ControlPlane, RoutineRevisionFilter};
use sim_core::{Clock, ConnectorError, RoutineRevision};
use sim_storage::{ExtractedRange, StateStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Store table owned by this library (holds only the extraction range).
const RANGE_TABLE: &str = "routine_revisions";

/// Timings and paging for the routine library.
#[derive(Debug, Clone)]
pub struct RoutineLibraryConfig {
    pub library_update_interval: Duration,
    pub pagination_limit: usize,
}

impl Default for RoutineLibraryConfig {
    fn default() -> Self {
        Self { library_update_interval: Duration::from_secs(10), pagination_limit: 100 }
    }
}

/// Local view of routine revisions for one simulator.
pub struct RoutineLibrary<C: Clock> {
    client: Arc<dyn ControlPlane>,
    store: Arc<StateStore>,
    clock: C,
    config: RoutineLibraryConfig,
    simulator_external_id: String,
    /// Revisions keyed by external id.
    state: Mutex<HashMap<String, RoutineRevision>>,
}

impl<C: Clock> RoutineLibrary<C> {
    pub fn new(
        client: Arc<dyn ControlPlane>,
        store: Arc<StateStore>,
        clock: C,
        simulator_external_id: impl Into<String>,
        config: RoutineLibraryConfig,
    ) -> Self {
        Self {
            client,
            store,
            clock,
            config,
            simulator_external_id: simulator_external_id.into(),
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Initial full sync: restore the persisted extraction range, then list
    /// everything for this simulator with cursor pagination.
    pub async fn init(&self, cancel: &CancellationToken) -> Result<(), ConnectorError> {
        if let Some(range) = self.store.extracted_range(RANGE_TABLE) {
            debug!(first = range.first, last = range.last, "restored extraction range");
        }
        let count = self.sync(None, cancel).await?;
        info!(revisions = count, "routine library initialized");
        Ok(())
    }

    /// The background convergence activity.
    pub fn run_tasks(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Vec<BoxFuture<'static, Result<(), ConnectorError>>> {
        let this = Arc::clone(self);
        vec![async move { this.poll_loop(cancel).await }.boxed()]
    }

    async fn poll_loop(self: Arc<Self>, cancel: CancellationToken) -> Result<(), ConnectorError> {
        loop {
            tokio::select! {
                _ = self.clock.sleep(self.config.library_update_interval) => {}
                _ = cancel.cancelled() => return Ok(()),
            }
            // Advance from the end of the covered window, so unchanged
            // routines are not re-downloaded.
            let after = self.store.extracted_range(RANGE_TABLE).map(|r| r.last);
            match self.sync(after, &cancel).await {
                Ok(0) => {}
                Ok(count) => debug!(revisions = count, "routine catalog advanced"),
                Err(err) if err.kind().restarts_group() => {
                    error!(error = %err, "routine library poll failed fatally");
                    return Err(err);
                }
                Err(err) if err.is_cancelled() => return Ok(()),
                Err(err) => warn!(error = %err, "routine library poll failed, will retry"),
            }
        }
    }

    /// List pages from the remote and merge them, honoring the pagination
    /// limit. Returns how many revisions were merged.
    async fn sync(
        &self,
        created_after: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<usize, ConnectorError> {
        let mut cursor = None;
        let mut merged = 0usize;
        let mut window = self.store.extracted_range(RANGE_TABLE);
        loop {
            if cancel.is_cancelled() {
                return Err(ConnectorError::cancelled());
            }
            let filter = RoutineRevisionFilter {
                simulator_external_id: Some(self.simulator_external_id.clone()),
                created_after,
            };
            let page = self
                .client
                .list_routine_revisions(filter, cursor, self.config.pagination_limit)
                .await
                .map_err(ConnectorError::from)?;

            for revision in page.items {
                let created = revision.created_time;
                window = Some(match window {
                    None => ExtractedRange { first: created, last: created },
                    Some(range) => ExtractedRange {
                        first: range.first.min(created),
                        last: range.last.max(created),
                    },
                });
                self.state.lock().insert(revision.external_id.clone(), revision);
                merged += 1;
            }

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        if let Some(range) = window {
            self.store.restore_extracted_range(RANGE_TABLE, range);
        }
        Ok(merged)
    }

    /// The cached revision, fetching on demand with a single remote call
    /// when it is not in the catalog yet.
    pub async fn routine_revision(
        &self,
        external_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<RoutineRevision, ConnectorError> {
        if let Some(revision) = self.state.lock().get(external_id) {
            return Ok(revision.clone());
        }
        let revision = self
            .client
            .routine_revision_by_external_id(external_id)
            .await
            .map_err(ConnectorError::from)?;
        self.state.lock().insert(revision.external_id.clone(), revision.clone());
        Ok(revision)
    }

    /// Revisions that declare an enabled schedule (scheduler input).
    pub fn scheduled_revisions(&self) -> Vec<RoutineRevision> {
        self.state
            .lock()
            .values()
            .filter(|r| r.configuration.schedule.as_ref().is_some_and(|s| s.enabled))
            .cloned()
            .collect()
    }

    /// Snapshot of the whole catalog.
    pub fn revisions(&self) -> Vec<RoutineRevision> {
        self.state.lock().values().cloned().collect()
    }
}

#[cfg(test)]
#[path = "routine_tests.rs"]
mod tests;
