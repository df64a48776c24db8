// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run lifecycle tests against the mock control plane and fake simulator.

use super::*;
use sim_client::{ApiError, MockControlPlane, Op};
use sim_core::{
    FakeClock, ModelRevision, ParsingStatus, RoutineConfig, RoutineInput, RoutineOutput,
    RunInputOverride, RunType,
};
use sim_driver::{DriverError, FakeSimulator};
use sim_library::{FakeFetcher, ModelLibraryConfig, RoutineLibraryConfig};
use sim_storage::StateStore;

struct Harness {
    mock: MockControlPlane,
    sim: FakeSimulator,
    sink: Arc<RemoteLogSink>,
    runner: Arc<Runner<FakeClock>>,
    #[allow(dead_code)]
    dir: tempfile::TempDir,
}

fn routine_revision() -> RoutineRevision {
    RoutineRevision {
        id: 1,
        external_id: "routine-v1".into(),
        routine_external_id: "routine".into(),
        simulator_external_id: "TestSim".into(),
        model_external_id: "TestModel".into(),
        data_set_id: 1,
        created_time: 0,
        configuration: RoutineConfig {
            inputs: vec![RoutineInput {
                reference_id: "in1".into(),
                name: None,
                value: Some(InputValue::Double(10.0)),
                unit: None,
                source_external_id: None,
                save_timeseries_external_id: Some("ts-in1".into()),
            }],
            outputs: vec![RoutineOutput {
                reference_id: "out1".into(),
                name: None,
                unit: None,
                save_timeseries_external_id: Some("ts-out1".into()),
            }],
            ..RoutineConfig::default()
        },
        script: serde_json::Value::Null,
    }
}

fn model_revision() -> ModelRevision {
    ModelRevision {
        id: 42,
        external_id: "TestModelExternalId-v1".into(),
        model_external_id: "TestModel".into(),
        simulator_external_id: "TestSim".into(),
        data_set_id: 1,
        file_id: 100,
        created_time: 1,
        last_updated_time: 1,
        version_number: 1,
        log_id: None,
        status: ParsingStatus::Unknown,
        status_message: None,
        external_dependencies: vec![],
    }
}

fn ready_run(id: i64) -> SimulationRun {
    SimulationRun {
        id,
        simulator_external_id: "TestSim".into(),
        routine_revision_external_id: "routine-v1".into(),
        model_revision_external_id: "TestModelExternalId-v1".into(),
        status: RunStatus::Ready,
        status_message: None,
        run_type: RunType::External,
        run_time: Some(5_000_000),
        simulation_time: None,
        run_inputs: vec![],
        log_id: Some(600),
        created_time: 0,
        last_updated_time: 0,
    }
}

fn setup_with(config: RunnerConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockControlPlane::new();
    let sim = FakeSimulator::new();
    let fetcher = FakeFetcher::new();
    let clock = FakeClock::new();
    let store = Arc::new(StateStore::new(dir.path().join("state.db")));

    mock.seed_routine_revision(routine_revision());
    mock.seed_model_revision(model_revision());
    mock.seed_download_link(100, "http://files.local/100.csv");

    let models = Arc::new(ModelLibrary::new(
        Arc::new(mock.clone()),
        Arc::new(sim.clone()),
        Arc::new(fetcher.clone()),
        Arc::clone(&store),
        clock.clone(),
        "TestSim",
        ModelLibraryConfig {
            files_directory: dir.path().join("files"),
            ..ModelLibraryConfig::default()
        },
    ));
    let routines = Arc::new(RoutineLibrary::new(
        Arc::new(mock.clone()),
        store,
        clock.clone(),
        "TestSim",
        RoutineLibraryConfig::default(),
    ));
    let sink = Arc::new(RemoteLogSink::new(
        Arc::new(mock.clone()),
        true,
        LogSeverity::Information,
    ));
    let runner = Arc::new(Runner::new(
        Arc::new(mock.clone()),
        Arc::new(sim.clone()),
        models,
        routines,
        Arc::clone(&sink),
        clock,
        "TestSim",
        config,
    ));
    Harness { mock, sim, sink, runner, dir }
}

fn setup() -> Harness {
    setup_with(RunnerConfig::default())
}

/// Wait until the run reaches a terminal status.
async fn wait_terminal(mock: &MockControlPlane, run_id: i64) -> SimulationRun {
    for _ in 0..200 {
        if let Some(run) = mock.runs().into_iter().find(|r| r.id == run_id) {
            if run.status.is_terminal() {
                return run;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} never reached a terminal status");
}

#[tokio::test]
async fn lifecycle_reaches_success_with_logs_flushed() {
    let harness = setup();
    harness.mock.seed_run(ready_run(900));

    harness.runner.poll_ready(&CancellationToken::new()).await.unwrap();
    let run = wait_terminal(&harness.mock, 900).await;

    assert_eq!(run.status, RunStatus::Success);
    assert!(run.simulation_time.is_some(), "simulation time must be set");

    // Claim then terminal update, in order.
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

    // Logs reached the remote and the buffer drained.
    assert!(!harness.mock.logs(600).is_empty());
    assert_eq!(harness.sink.buffered(900), 0);

    // Declared input and output values were persisted to their series.
    let saved_in = harness.mock.datapoints("ts-in1");
    assert_eq!(saved_in.len(), 1);
    assert_eq!(saved_in[0].value, 10.0);
    let saved_out = harness.mock.datapoints("ts-out1");
    assert_eq!(saved_out.len(), 1);
    assert_eq!(saved_out[0].value, 142.0);
    assert_eq!(saved_out[0].timestamp, 5_000_000);
}

#[tokio::test]
async fn simulator_failure_carries_a_user_visible_message() {
    let harness = setup();
    harness.sim.fail_runs(DriverError::SimulatorFailure("solver diverged".into()));
    harness.mock.seed_run(ready_run(901));

    harness.runner.poll_ready(&CancellationToken::new()).await.unwrap();
    let run = wait_terminal(&harness.mock, 901).await;

    assert_eq!(run.status, RunStatus::Failure);
    assert_eq!(run.status_message.as_deref(), Some("solver diverged"));
}

#[tokio::test]
async fn user_override_replaces_the_declared_input() {
    let harness = setup();
    let mut run = ready_run(902);
    run.run_inputs = vec![RunInputOverride {
        reference_id: "in1".into(),
        value: InputValue::String("99.5".into()),
        unit: None,
    }];
    harness.mock.seed_run(run);

    harness.runner.poll_ready(&CancellationToken::new()).await.unwrap();
    let run = wait_terminal(&harness.mock, 902).await;

    assert_eq!(run.status, RunStatus::Success);
    // The override value (coerced from string) went to the input's series.
    let saved = harness.mock.datapoints("ts-in1");
    assert_eq!(saved[0].value, 99.5);
}

#[tokio::test]
async fn non_numeric_override_fails_the_run() {
    let harness = setup();
    let mut run = ready_run(903);
    run.run_inputs = vec![RunInputOverride {
        reference_id: "in1".into(),
        value: InputValue::String("not-a-number".into()),
        unit: None,
    }];
    harness.mock.seed_run(run);

    harness.runner.poll_ready(&CancellationToken::new()).await.unwrap();
    let run = wait_terminal(&harness.mock, 903).await;

    assert_eq!(run.status, RunStatus::Failure);
    assert!(run.status_message.unwrap_or_default().contains("in1"));
}

#[tokio::test]
async fn transient_claim_failure_still_finishes_the_run() {
    let harness = setup();
    harness.mock.seed_run(ready_run(904));
    harness.mock.fail_once("update_run", ApiError::Transport("connection reset".into()));

    harness.runner.poll_ready(&CancellationToken::new()).await.unwrap();
    let run = wait_terminal(&harness.mock, 904).await;
    assert_eq!(run.status, RunStatus::Success);
}

#[tokio::test]
async fn simulation_timeout_fails_the_run() {
    let harness = setup_with(RunnerConfig {
        run_timeout: Duration::from_millis(20),
        ..RunnerConfig::default()
    });
    harness.sim.set_run_delay(Duration::from_millis(200));
    harness.mock.seed_run(ready_run(905));

    harness.runner.poll_ready(&CancellationToken::new()).await.unwrap();
    let run = wait_terminal(&harness.mock, 905).await;

    assert_eq!(run.status, RunStatus::Failure);
    assert!(run.status_message.unwrap_or_default().contains("timed out"));
}

#[tokio::test]
async fn unparsable_model_fails_the_run() {
    let harness = setup();
    harness
        .sim
        .fail_extract("TestModelExternalId-v1", DriverError::ParseFailure("bad file".into()));
    harness.mock.seed_run(ready_run(906));

    harness.runner.poll_ready(&CancellationToken::new()).await.unwrap();
    let run = wait_terminal(&harness.mock, 906).await;

    assert_eq!(run.status, RunStatus::Failure);
    assert!(run.status_message.unwrap_or_default().contains("unreadable"));
}

#[tokio::test]
async fn a_poll_tick_never_claims_a_run_twice() {
    let harness = setup();
    harness.sim.set_run_delay(Duration::from_millis(100));
    harness.mock.seed_run(ready_run(907));
    let cancel = CancellationToken::new();

    // Two quick polls while the run is still executing.
    harness.runner.poll_ready(&cancel).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    harness.runner.poll_ready(&cancel).await.unwrap();
    wait_terminal(&harness.mock, 907).await;

    let claims = harness
        .mock
        .calls()
        .iter()
        .filter(|op| matches!(op, Op::UpdateRun { id: 907, status: RunStatus::Running }))
        .count();
    assert_eq!(claims, 1);
}

#[tokio::test]
async fn parallel_runs_both_complete_under_the_cap() {
    let harness = setup_with(RunnerConfig {
        max_concurrent_runs: 1,
        ..RunnerConfig::default()
    });
    harness.sim.set_run_delay(Duration::from_millis(30));
    harness.mock.seed_run(ready_run(908));
    harness.mock.seed_run(ready_run(909));

    harness.runner.poll_ready(&CancellationToken::new()).await.unwrap();
    let first = wait_terminal(&harness.mock, 908).await;
    let second = wait_terminal(&harness.mock, 909).await;
    assert_eq!(first.status, RunStatus::Success);
    assert_eq!(second.status, RunStatus::Success);
}
