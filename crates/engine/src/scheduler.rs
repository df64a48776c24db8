// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron-driven creation of `ready` simulation runs.
//!
//! One fire loop per scheduled routine: fires are strictly serialized within
//! a routine and independent across routines. The convergence pass
//! re-reads the routine catalog at most `update_interval` apart, starting
//! loops for newly scheduled routines and replacing loops whose cron
//! expression changed remotely.

use crate::cron::CronSchedule;
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use sim_client::ControlPlane;
use sim_core::{Clock, ConnectorError, RoutineRevision, RunCreate, RunType};
use sim_library::RoutineLibrary;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// `connector.scheduler.updateInterval`: maximum time between schedule
    /// re-evaluations.
    pub update_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { update_interval: Duration::from_secs(10) }
    }
}

struct FireLoop {
    cron_expression: String,
    revision_external_id: String,
    cancel: CancellationToken,
}

/// Emits scheduled runs for every routine revision declaring a schedule.
pub struct Scheduler<C: Clock> {
    client: Arc<dyn ControlPlane>,
    routines: Arc<RoutineLibrary<C>>,
    clock: C,
    config: SchedulerConfig,
    /// Active fire loops, keyed by routine external id.
    active: Mutex<HashMap<String, FireLoop>>,
}

/// Sleep duration until the next cron fire plus the canonical epoch-ms run
/// time to stamp on the created run.
pub fn next_job_delay_and_run_time<C: Clock>(
    schedule: &CronSchedule,
    clock: &C,
) -> Option<(Duration, i64)> {
    let now = clock.now_local();
    let next = schedule.next_fire(now)?;
    let delay = next.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO);
    Some((delay, next.timestamp_millis()))
}

impl<C: Clock> Scheduler<C> {
    pub fn new(
        client: Arc<dyn ControlPlane>,
        routines: Arc<RoutineLibrary<C>>,
        clock: C,
        config: SchedulerConfig,
    ) -> Self {
        Self { client, routines, clock, config, active: Mutex::new(HashMap::new()) }
    }

    pub fn run_tasks(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Vec<BoxFuture<'static, Result<(), ConnectorError>>> {
        let this = Arc::clone(self);
        vec![async move { this.converge_loop(cancel).await }.boxed()]
    }

    async fn converge_loop(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<(), ConnectorError> {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.reconcile(&cancel);
            tokio::select! {
                _ = self.clock.sleep(self.config.update_interval) => {}
                _ = cancel.cancelled() => break,
            }
        }
        // Stop every fire loop; in-flight creates drain on their own tokens.
        let active = std::mem::take(&mut *self.active.lock());
        for (_, fire) in active {
            fire.cancel.cancel();
        }
        Ok(())
    }

    /// Reconcile fire loops against the current routine catalog.
    ///
    /// The latest revision per routine wins; a cron change remotely shows up
    /// as a new revision (or an edited expression) and replaces the loop.
    fn reconcile(self: &Arc<Self>, cancel: &CancellationToken) {
        let mut latest: HashMap<String, RoutineRevision> = HashMap::new();
        for revision in self.routines.scheduled_revisions() {
            match latest.get(&revision.routine_external_id) {
                Some(existing) if existing.created_time >= revision.created_time => {}
                _ => {
                    latest.insert(revision.routine_external_id.clone(), revision);
                }
            }
        }

        let mut active = self.active.lock();

        // Drop loops whose routine vanished or whose schedule changed.
        let keys: HashSet<String> = active.keys().cloned().collect();
        for key in keys {
            let stale = match latest.get(&key) {
                None => true,
                Some(revision) => {
                    let schedule = revision.configuration.schedule.as_ref();
                    let fire = &active[&key];
                    schedule.map(|s| s.cron_expression.as_str())
                        != Some(fire.cron_expression.as_str())
                        || revision.external_id != fire.revision_external_id
                }
            };
            if stale {
                if let Some(fire) = active.remove(&key) {
                    debug!(routine = %key, "stopping stale schedule loop");
                    fire.cancel.cancel();
                }
            }
        }

        // Start loops for newly scheduled routines.
        for (routine, revision) in latest {
            if active.contains_key(&routine) {
                continue;
            }
            let Some(schedule_cfg) = revision.configuration.schedule.clone() else {
                continue;
            };
            let schedule = match CronSchedule::parse(&schedule_cfg.cron_expression) {
                Ok(schedule) => schedule,
                Err(err) => {
                    warn!(
                        routine = %routine,
                        expression = %schedule_cfg.cron_expression,
                        error = %err,
                        "invalid cron expression, skipping schedule"
                    );
                    continue;
                }
            };

            let fire_cancel = cancel.child_token();
            info!(
                routine = %routine,
                revision = %revision.external_id,
                expression = %schedule_cfg.cron_expression,
                "starting schedule loop"
            );
            active.insert(
                routine.clone(),
                FireLoop {
                    cron_expression: schedule_cfg.cron_expression,
                    revision_external_id: revision.external_id.clone(),
                    cancel: fire_cancel.clone(),
                },
            );

            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.fire_loop(revision, schedule, fire_cancel).await;
            });
        }
    }

    /// Fire loop for one routine revision: sleep to the next cron time,
    /// create the run, repeat. Creation failures log and wait for the next
    /// fire; the tick after a remote outage catches up naturally.
    async fn fire_loop(
        &self,
        revision: RoutineRevision,
        schedule: CronSchedule,
        cancel: CancellationToken,
    ) {
        loop {
            let Some((delay, run_time)) = next_job_delay_and_run_time(&schedule, &self.clock)
            else {
                warn!(routine = %revision.routine_external_id, "schedule has no next fire time");
                return;
            };
            tokio::select! {
                _ = self.clock.sleep(delay) => {}
                _ = cancel.cancelled() => return,
            }

            let create = RunCreate {
                routine_external_id: revision.routine_external_id.clone(),
                run_type: RunType::Scheduled,
                run_time: Some(run_time),
            };
            tokio::select! {
                result = self.client.create_runs(vec![create]) => match result {
                    Ok(runs) => {
                        debug!(
                            routine = %revision.routine_external_id,
                            run_id = runs.first().map(|r| r.id).unwrap_or_default(),
                            run_time,
                            "scheduled run created"
                        );
                    }
                    Err(err) => {
                        warn!(
                            routine = %revision.routine_external_id,
                            error = %err,
                            "scheduled run creation failed"
                        );
                    }
                },
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// Number of live fire loops (test visibility).
    pub fn active_loops(&self) -> usize {
        self.active.lock().len()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
