// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Model library convergence and materialization tests.

use super::*;
use crate::fetcher::{FakeFetcher, FakeOutcome};
use sim_client::MockControlPlane;
use sim_core::{DependencyFile, FakeClock};
use sim_driver::{DriverCall, DriverError, FakeSimulator};

struct Harness {
    mock: MockControlPlane,
    sim: FakeSimulator,
    fetcher: FakeFetcher,
    store: Arc<StateStore>,
    library: Arc<ModelLibrary<FakeClock>>,
    // NOTE(lifetime): keeps the files directory alive for the test
    #[allow(dead_code)]
    dir: tempfile::TempDir,
}

fn setup() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockControlPlane::new();
    let sim = FakeSimulator::new();
    let fetcher = FakeFetcher::new();
    let store = Arc::new(StateStore::new(dir.path().join("state.db")));
    let config = ModelLibraryConfig {
        files_directory: dir.path().join("files"),
        ..ModelLibraryConfig::default()
    };
    let library = Arc::new(ModelLibrary::new(
        Arc::new(mock.clone()),
        Arc::new(sim.clone()),
        Arc::new(fetcher.clone()),
        Arc::clone(&store),
        FakeClock::new(),
        "TestSim",
        config,
    ));
    Harness { mock, sim, fetcher, store, library, dir }
}

fn test_revision() -> ModelRevision {
    ModelRevision {
        id: 42,
        external_id: "TestModelExternalId-v1".into(),
        model_external_id: "TestModel".into(),
        simulator_external_id: "TestSim".into(),
        data_set_id: 7,
        file_id: 100,
        created_time: 1,
        last_updated_time: 1,
        version_number: 1,
        log_id: None,
        status: sim_core::ParsingStatus::Unknown,
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

fn seed(harness: &Harness) {
    harness.mock.seed_model_revision(test_revision());
    harness.mock.seed_download_link(100, "http://files.local/100.csv");
    harness.mock.seed_download_link(101, "http://files.local/101.xml");
    harness.mock.seed_download_link(102, "http://files.local/102.xml");
}

fn files_dir(harness: &Harness) -> PathBuf {
    harness.dir.path().join("files")
}

#[tokio::test]
async fn five_concurrent_requests_share_one_discovery_and_parse() {
    let harness = setup();
    seed(&harness);

    let mut handles = Vec::new();
    for _ in 0..5 {
        let library = Arc::clone(&harness.library);
        handles.push(tokio::spawn(async move {
            library.model_revision("TestModelExternalId-v1", &CancellationToken::new()).await
        }));
    }
    let mut states = Vec::new();
    for handle in handles {
        states.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(harness.sim.extract_count(), 1);
    assert!(files_dir(&harness).join("100/100.csv").exists());
    assert!(files_dir(&harness).join("101/101.xml").exists());
    assert!(files_dir(&harness).join("102/102.xml").exists());
    for state in &states[1..] {
        assert_eq!(state, &states[0]);
    }
    assert!(states[0].processed);
    assert!(states[0].downloaded);

    // A single remote retrieve served all five callers.
    let retrieves = harness
        .mock
        .calls()
        .iter()
        .filter(|op| matches!(op, sim_client::Op::ModelRevisionByExternalId(_)))
        .count();
    assert_eq!(retrieves, 1);
}

#[tokio::test]
async fn partial_dependency_failure_returns_state_without_parsing() {
    let harness = setup();
    seed(&harness);
    harness.fetcher.script("http://files.local/101.xml", FakeOutcome::Status(410));

    let state = harness
        .library
        .model_revision("TestModelExternalId-v1", &CancellationToken::new())
        .await
        .unwrap();

    assert!(!state.downloaded);
    assert!(!state.parsing_info.parsed);
    assert!(state.dependency_files[0].file_path.is_none());
    assert!(state.dependency_files[1].file_path.is_some());
    assert_eq!(harness.sim.extract_count(), 0);
}

#[tokio::test]
async fn failed_dependency_recovers_on_the_next_sweep() {
    let harness = setup();
    seed(&harness);
    harness.fetcher.script("http://files.local/101.xml", FakeOutcome::Status(410));
    let cancel = CancellationToken::new();

    harness.library.poll_once(&cancel).await.unwrap();
    assert_eq!(harness.sim.extract_count(), 0);

    // The 410 was scripted once; the next convergence pass completes.
    harness.library.poll_once(&cancel).await.unwrap();
    assert_eq!(harness.sim.extract_count(), 1);
    let state = &harness.library.states()[0];
    assert!(state.downloaded);
    assert!(state.processed);
}

#[tokio::test]
async fn remote_status_reset_triggers_reparse() {
    let harness = setup();
    seed(&harness);
    let cancel = CancellationToken::new();

    harness.library.poll_once(&cancel).await.unwrap();
    assert_eq!(harness.sim.extract_count(), 1);
    assert_eq!(
        harness.mock.model_revision("TestModelExternalId-v1").unwrap().status,
        ParsingStatus::Success
    );

    // Idempotent: a second pass does not re-parse a processed revision.
    harness.library.poll_once(&cancel).await.unwrap();
    assert_eq!(harness.sim.extract_count(), 1);

    // Remote asks for a re-parse.
    harness.mock.set_model_revision_status("TestModelExternalId-v1", ParsingStatus::Unknown);
    harness.library.poll_once(&cancel).await.unwrap();
    assert_eq!(harness.sim.extract_count(), 2);
    assert_eq!(
        harness.mock.model_revision("TestModelExternalId-v1").unwrap().status,
        ParsingStatus::Success
    );
}

#[tokio::test]
async fn parse_failure_is_terminal_until_remote_reset() {
    let harness = setup();
    seed(&harness);
    harness
        .sim
        .fail_extract("TestModelExternalId-v1", DriverError::ParseFailure("bad flowsheet".into()));
    let cancel = CancellationToken::new();

    harness.library.poll_once(&cancel).await.unwrap();
    let state = &harness.library.states()[0];
    assert!(!state.can_read);
    assert!(state.processed);
    assert_eq!(state.parsing_info.status, ParsingStatus::Failure);
    let remote = harness.mock.model_revision("TestModelExternalId-v1").unwrap();
    assert_eq!(remote.status, ParsingStatus::Failure);
    assert_eq!(remote.status_message.as_deref(), Some("model parse failed: bad flowsheet"));

    // Out of the rotation: no more parse attempts.
    harness.library.poll_once(&cancel).await.unwrap();
    assert_eq!(harness.sim.extract_count(), 1);

    // Until the remote resets to unknown.
    harness.sim.clear_extract_failure("TestModelExternalId-v1");
    harness.mock.set_model_revision_status("TestModelExternalId-v1", ParsingStatus::Unknown);
    harness.library.poll_once(&cancel).await.unwrap();
    assert_eq!(harness.sim.extract_count(), 2);
}

#[tokio::test]
async fn too_large_download_defers_and_counts_attempts() {
    let harness = setup();
    seed(&harness);
    harness.fetcher.script("http://files.local/100.csv", FakeOutcome::TooLarge);
    let cancel = CancellationToken::new();

    harness.library.poll_once(&cancel).await.unwrap();
    let state = &harness.library.states()[0];
    assert_eq!(state.download_attempts, 1);
    assert!(!state.processed);
    assert!(state.file_path.is_none());

    harness.library.poll_once(&cancel).await.unwrap();
    let state = &harness.library.states()[0];
    assert!(state.processed);
}

#[tokio::test]
async fn oversized_file_marks_revision_unreadable() {
    let harness = setup();
    seed(&harness);
    harness.fetcher.script("http://files.local/100.csv", FakeOutcome::SizeExceeded);
    let cancel = CancellationToken::new();

    harness.library.poll_once(&cancel).await.unwrap();
    let state = &harness.library.states()[0];
    assert!(!state.can_read);
    assert_eq!(harness.sim.extract_count(), 0);

    // Permanently out of the rotation.
    harness.library.poll_once(&cancel).await.unwrap();
    assert_eq!(harness.fetcher.download_count("http://files.local/100.csv"), 1);
}

#[tokio::test]
async fn deleted_remote_revision_is_evicted_with_its_files() {
    let harness = setup();
    seed(&harness);
    let cancel = CancellationToken::new();

    harness.library.poll_once(&cancel).await.unwrap();
    assert!(files_dir(&harness).join("100/100.csv").exists());

    harness.mock.remove_model_revision("TestModelExternalId-v1");
    harness.library.poll_once(&cancel).await.unwrap();
    assert!(harness.library.states().is_empty());
    assert!(!files_dir(&harness).join("100").exists());
    assert!(harness.store.scan::<LocalModelState>("model_revisions").is_empty());
}

#[tokio::test]
async fn persisted_state_survives_restart_and_revalidates() {
    let dir;
    {
        let harness = setup();
        seed(&harness);
        harness.library.poll_once(&CancellationToken::new()).await.unwrap();
        harness.store.flush().unwrap();
        // Simulate a lost file between runs.
        std::fs::remove_file(files_dir(&harness).join("100/100.csv")).unwrap();
        dir = harness.dir;
    }

    let store = Arc::new(StateStore::new(dir.path().join("state.db")));
    store.load().unwrap();
    let mock = MockControlPlane::new();
    let sim = FakeSimulator::new();
    let fetcher = FakeFetcher::new();
    let library = Arc::new(ModelLibrary::new(
        Arc::new(mock.clone()),
        Arc::new(sim.clone()),
        Arc::new(fetcher.clone()),
        Arc::clone(&store),
        FakeClock::new(),
        "TestSim",
        ModelLibraryConfig {
            files_directory: dir.path().join("files"),
            ..ModelLibraryConfig::default()
        },
    ));
    library.init().unwrap();

    let states = library.states();
    assert_eq!(states.len(), 1);
    let state = &states[0];
    // Demoted: primary gone, dependency paths intact.
    assert!(!state.processed);
    assert!(state.file_path.is_none());
    assert_eq!(
        state.dependency_files.iter().filter(|d| d.file_path.is_some()).count(),
        2,
        "dependency files survived on disk"
    );

    // Next access re-downloads only the primary and re-parses.
    mock.seed_download_link(100, "http://files.local/100.csv");
    let state = library
        .model_revision("TestModelExternalId-v1", &CancellationToken::new())
        .await
        .unwrap();
    assert!(state.processed);
    assert_eq!(fetcher.download_count("http://files.local/100.csv"), 1);
    assert_eq!(fetcher.download_count("http://files.local/101.xml"), 0);
}

#[tokio::test]
async fn shared_dependency_file_downloads_once() {
    let harness = setup();
    seed(&harness);
    let mut second = test_revision();
    second.id = 43;
    second.external_id = "TestModelExternalId-v2".into();
    second.file_id = 200;
    harness.mock.seed_model_revision(second);
    harness.mock.seed_download_link(200, "http://files.local/200.csv");

    harness.library.poll_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(harness.fetcher.download_count("http://files.local/101.xml"), 1);
    let states = harness.library.states();
    let paths: Vec<_> = states
        .iter()
        .map(|s| s.dependency_files.iter().find(|d| d.file_id == 101).unwrap().file_path.clone())
        .collect();
    assert_eq!(paths[0], paths[1], "both revisions observe the same local path");
}

#[tokio::test]
async fn foreign_revision_lands_in_temp_and_is_wiped() {
    let harness = setup();
    let mut foreign = test_revision();
    foreign.external_id = "OtherSimModel-v1".into();
    foreign.simulator_external_id = "OtherSim".into();
    foreign.external_dependencies.clear();
    foreign.file_id = 900;
    harness.mock.seed_model_revision(foreign);
    harness.mock.seed_download_link(900, "http://files.local/900.csv");

    let state = harness
        .library
        .model_revision("OtherSimModel-v1", &CancellationToken::new())
        .await
        .unwrap();
    assert!(state.processed);
    let temp_file = files_dir(&harness).join("temp/900/900.csv");
    assert!(temp_file.exists());
    // Foreign revisions never enter the main map.
    assert!(harness.library.states().is_empty());

    harness.library.wipe_temporary_files();
    assert!(!temp_file.exists());
}
