// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Buffered, per-run forwarding of structured logs to the control plane.
//!
//! Each run gets an independent scope: its own buffer, its own target log
//! resource, and its own minimum severity (a run may request Debug without
//! affecting any other run). `flush` uploads every scope's buffer and
//! clears it; the runner flushes on terminal transitions and a periodic
//! timer flushes out-of-band.

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use sim_client::ControlPlane;
use sim_core::{Clock, ConnectorError, LogEntry, LogSeverity};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct Scope {
    log_id: Option<i64>,
    min_severity: LogSeverity,
    entries: Vec<LogEntry>,
}

/// Buffered log forwarder, scoped by run id.
pub struct RemoteLogSink {
    client: Arc<dyn ControlPlane>,
    enabled: bool,
    /// Default minimum severity for scopes that do not override it.
    default_severity: LogSeverity,
    scopes: Mutex<HashMap<i64, Scope>>,
}

impl RemoteLogSink {
    pub fn new(client: Arc<dyn ControlPlane>, enabled: bool, default_severity: LogSeverity) -> Self {
        Self { client, enabled, default_severity, scopes: Mutex::new(HashMap::new()) }
    }

    /// Open a scope for a run. `min_severity` of `None` uses the sink
    /// default; re-opening an existing scope updates its target and filter
    /// but keeps buffered entries.
    pub fn begin_scope(&self, run_id: i64, log_id: Option<i64>, min_severity: Option<LogSeverity>) {
        let mut scopes = self.scopes.lock();
        let min = min_severity.unwrap_or(self.default_severity);
        let scope = scopes
            .entry(run_id)
            .or_insert_with(|| Scope { log_id: None, min_severity: min, entries: Vec::new() });
        scope.log_id = log_id.or(scope.log_id);
        scope.min_severity = min;
    }

    /// Append an entry to a run's buffer; entries below the scope's minimum
    /// severity are dropped.
    pub fn log(&self, run_id: i64, severity: LogSeverity, message: impl Into<String>, now_ms: i64) {
        if !self.enabled {
            return;
        }
        let mut scopes = self.scopes.lock();
        let Some(scope) = scopes.get_mut(&run_id) else {
            return;
        };
        if severity < scope.min_severity {
            return;
        }
        scope.entries.push(LogEntry { timestamp: now_ms, severity, message: message.into() });
    }

    /// Buffered entry count for one run (flush decisions and tests).
    pub fn buffered(&self, run_id: i64) -> usize {
        self.scopes.lock().get(&run_id).map_or(0, |s| s.entries.len())
    }

    /// Upload every scope's buffered entries, clearing what was sent.
    ///
    /// Failed uploads keep their entries for the next flush. Scopes without
    /// a remote log resource are dropped silently.
    pub async fn flush(&self) {
        let pending: Vec<(i64, i64, Vec<LogEntry>)> = {
            let mut scopes = self.scopes.lock();
            scopes
                .iter_mut()
                .filter(|(_, s)| !s.entries.is_empty())
                .filter_map(|(run_id, scope)| {
                    let log_id = scope.log_id?;
                    Some((*run_id, log_id, std::mem::take(&mut scope.entries)))
                })
                .collect()
        };

        for (run_id, log_id, entries) in pending {
            let count = entries.len();
            match self.client.append_logs(log_id, entries.clone()).await {
                Ok(()) => debug!(run_id, log_id, count, "forwarded run logs"),
                Err(err) => {
                    warn!(run_id, log_id, error = %err, "log flush failed, re-buffering");
                    let mut scopes = self.scopes.lock();
                    if let Some(scope) = scopes.get_mut(&run_id) {
                        // Prepend so ordering survives a retry.
                        let mut restored = entries;
                        restored.append(&mut scope.entries);
                        scope.entries = restored;
                    }
                }
            }
        }
    }

    /// Flush one final time and drop a finished run's scope.
    pub async fn end_scope(&self, run_id: i64) {
        self.flush().await;
        self.scopes.lock().remove(&run_id);
    }

    /// The periodic out-of-band flush activity.
    pub fn run_tasks<C: Clock>(
        self: &Arc<Self>,
        clock: C,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Vec<BoxFuture<'static, Result<(), ConnectorError>>> {
        let this = Arc::clone(self);
        vec![async move {
            loop {
                tokio::select! {
                    _ = clock.sleep(interval) => {}
                    _ = cancel.cancelled() => {
                        this.flush().await;
                        return Ok(());
                    }
                }
                this.flush().await;
            }
        }
        .boxed()]
    }
}

#[cfg(test)]
#[path = "log_sink_tests.rs"]
mod tests;
