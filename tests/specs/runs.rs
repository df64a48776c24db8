//! Run lifecycle specs
//!
//! A ready run carried to success, with status updates and log records
//! reaching the control plane.

use crate::prelude::*;
use sim_engine::{RemoteLogSink, Runner, RunnerConfig};

#[tokio::test]
async fn run_lifecycle_with_log_flush() {
    let harness = library_harness(FakeClock::new());
    seed_model(&harness.mock);
    harness.mock.seed_routine_revision(test_routine_revision(None));
    harness.mock.seed_run(ready_run(900));
    harness.sim.set_outputs([("out1".to_string(), 142.0)].into());

    let sink = Arc::new(RemoteLogSink::new(
        Arc::new(harness.mock.clone()),
        true,
        LogSeverity::Information,
    ));
    let runner = Arc::new(Runner::new(
        Arc::new(harness.mock.clone()),
        Arc::new(harness.sim.clone()),
        Arc::clone(&harness.models),
        Arc::clone(&harness.routines),
        Arc::clone(&sink),
        FakeClock::new(),
        SIMULATOR,
        RunnerConfig::default(),
    ));

    runner.poll_ready(&CancellationToken::new()).await.expect("claim pass");
    let finished = wait_until(Duration::from_secs(5), || {
        harness.mock.runs().iter().any(|r| r.id == 900 && r.status.is_terminal())
    })
    .await;
    assert!(finished, "run never reached a terminal status");

    let run = harness.mock.runs().into_iter().find(|r| r.id == 900).expect("run");
    assert_eq!(run.status, RunStatus::Success);
    assert!(run.simulation_time.is_some(), "simulation time must be set");

    // The remote received both status updates, in order.
    let updates: Vec<RunStatus> = harness
        .mock
        .calls()
        .iter()
        .filter_map(|op| match op {
            Op::UpdateRun { id: 900, status } => Some(*status),
            _ => None,
        })
        .collect();
    assert_eq!(updates, vec![RunStatus::Running, RunStatus::Success]);

    // And at least one forwarded log record for the run.
    assert!(!harness.mock.logs(600).is_empty(), "expected forwarded log records");

    // The declared output landed in its time series.
    let saved = harness.mock.datapoints("ts-out1");
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].value, 142.0);
}
