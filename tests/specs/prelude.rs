//! Shared fixtures for the workspace specs.

pub use sim_client::{ControlPlane, MockControlPlane, Op};
pub use sim_core::{
    Datapoint, DependencyFile, FakeClock, InputValue, LogSeverity, ModelRevision, ParsingStatus,
    RoutineConfig, RoutineInput, RoutineOutput, RoutineRevision, RoutineSchedule, RunStatus,
    RunType, SimulationRun,
};
pub use sim_driver::{DriverCall, DriverError, FakeSimulator};
pub use sim_library::{FakeFetcher, FakeOutcome};
pub use std::sync::Arc;
pub use std::time::Duration;
pub use tokio_util::sync::CancellationToken;

use parking_lot::Mutex;
use sim_connector::{ConnectorConfig, ConnectorRuntime};
use sim_library::{ModelLibrary, ModelLibraryConfig, RoutineLibrary, RoutineLibraryConfig};
use sim_storage::StateStore;
use tracing_subscriber::fmt::MakeWriter;

pub const SIMULATOR: &str = "TestSim";

// ── Resource fixtures ───────────────────────────────────────────────────

/// The model revision used across scenarios: primary file 100 plus two
/// dependency files with simulator addresses.
pub fn test_model_revision() -> ModelRevision {
    ModelRevision {
        id: 42,
        external_id: "TestModelExternalId-v1".into(),
        model_external_id: "TestModel".into(),
        simulator_external_id: SIMULATOR.into(),
        data_set_id: 7,
        file_id: 100,
        created_time: 1,
        last_updated_time: 1,
        version_number: 1,
        log_id: None,
        status: ParsingStatus::Unknown,
        status_message: None,
        external_dependencies: vec![
            DependencyFile {
                file_id: 101,
                arguments: [("address".to_string(), "test.address.1".to_string())].into(),
            },
            DependencyFile {
                file_id: 102,
                arguments: [("address".to_string(), "test.address.2".to_string())].into(),
            },
        ],
    }
}

pub fn test_routine_revision(cron: Option<&str>) -> RoutineRevision {
    RoutineRevision {
        id: 1,
        external_id: "TestRoutine-v1".into(),
        routine_external_id: "TestRoutine".into(),
        simulator_external_id: SIMULATOR.into(),
        model_external_id: "TestModel".into(),
        data_set_id: 7,
        created_time: 0,
        configuration: RoutineConfig {
            inputs: vec![RoutineInput {
                reference_id: "in1".into(),
                name: None,
                value: Some(InputValue::Double(10.0)),
                unit: None,
                source_external_id: None,
                save_timeseries_external_id: None,
            }],
            outputs: vec![RoutineOutput {
                reference_id: "out1".into(),
                name: None,
                unit: None,
                save_timeseries_external_id: Some("ts-out1".into()),
            }],
            schedule: cron.map(|expression| RoutineSchedule {
                enabled: true,
                cron_expression: expression.into(),
            }),
            ..RoutineConfig::default()
        },
        script: serde_json::Value::Null,
    }
}

pub fn ready_run(id: i64) -> SimulationRun {
    SimulationRun {
        id,
        simulator_external_id: SIMULATOR.into(),
        routine_revision_external_id: "TestRoutine-v1".into(),
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

/// Seed the mock with the standard model revision and its download links.
pub fn seed_model(mock: &MockControlPlane) {
    mock.seed_model_revision(test_model_revision());
    mock.seed_download_link(100, "http://files.local/100.csv");
    mock.seed_download_link(101, "http://files.local/101.xml");
    mock.seed_download_link(102, "http://files.local/102.xml");
}

// ── Component harnesses ─────────────────────────────────────────────────

pub struct LibraryHarness {
    pub mock: MockControlPlane,
    pub sim: FakeSimulator,
    pub fetcher: FakeFetcher,
    pub models: Arc<ModelLibrary<FakeClock>>,
    pub routines: Arc<RoutineLibrary<FakeClock>>,
    pub store: Arc<StateStore>,
    pub dir: tempfile::TempDir,
}

pub fn library_harness(clock: FakeClock) -> LibraryHarness {
    let dir = tempfile::tempdir().expect("tempdir");
    let mock = MockControlPlane::new();
    let sim = FakeSimulator::new();
    let fetcher = FakeFetcher::new();
    let store = Arc::new(StateStore::new(dir.path().join("state.db")));
    let models = Arc::new(ModelLibrary::new(
        Arc::new(mock.clone()),
        Arc::new(sim.clone()),
        Arc::new(fetcher.clone()),
        Arc::clone(&store),
        clock.clone(),
        SIMULATOR,
        ModelLibraryConfig {
            files_directory: dir.path().join("files"),
            ..ModelLibraryConfig::default()
        },
    ));
    let routines = Arc::new(RoutineLibrary::new(
        Arc::new(mock.clone()),
        Arc::clone(&store),
        clock,
        SIMULATOR,
        RoutineLibraryConfig::default(),
    ));
    LibraryHarness { mock, sim, fetcher, models, routines, store, dir }
}

pub struct ConnectorHarness {
    pub mock: MockControlPlane,
    pub sim: FakeSimulator,
    pub runtime: Arc<ConnectorRuntime<FakeClock>>,
    pub dir: tempfile::TempDir,
}

pub fn connector_harness(clock: FakeClock) -> ConnectorHarness {
    let dir = tempfile::tempdir().expect("tempdir");
    let mock = MockControlPlane::new();
    let sim = FakeSimulator::new();
    let mut config = ConnectorConfig::default();
    config.cognite.host = "https://mock".into();
    config.cognite.project = "test".into();
    config.connector.name_prefix = "test-connector".into();
    config.connector.add_machine_name_suffix = false;
    config.simulator.external_id = SIMULATOR.into();
    config.runner.poll_interval = 1;
    config.model_library.files_directory = dir.path().join("files");
    config.model_library.state_store_file = dir.path().join("state.db");

    let runtime = Arc::new(ConnectorRuntime::new(
        config,
        Arc::new(mock.clone()),
        Arc::new(sim.clone()),
        Arc::new(FakeFetcher::new()),
        clock,
    ));
    ConnectorHarness { mock, sim, runtime, dir }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ── Log capture ─────────────────────────────────────────────────────────

/// Captures formatted tracing output for assertions on literal messages.
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).to_string()
    }

    pub fn occurrences(&self, needle: &str) -> usize {
        self.contents().matches(needle).count()
    }

    /// Install as the thread default; keep the guard alive for the test.
    /// Use with a current-thread runtime so spawned tasks log here too.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber =
            tracing_subscriber::fmt().with_ansi(false).with_writer(self.clone()).finish();
        tracing::subscriber::set_default(subscriber)
    }
}

pub struct LogCaptureWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl std::io::Write for LogCaptureWriter {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter { buf: Arc::clone(&self.buf) }
    }
}
