//! Model library specs
//!
//! Deduplicated materialization and partial dependency failure, end to end
//! against the mock control plane.

use crate::prelude::*;

#[tokio::test]
async fn deduplicated_model_fetch() {
    let harness = library_harness(FakeClock::new());
    seed_model(&harness.mock);

    // Five concurrent requests for a revision the library has never seen.
    let mut handles = Vec::new();
    for _ in 0..5 {
        let models = Arc::clone(&harness.models);
        handles.push(tokio::spawn(async move {
            models.model_revision("TestModelExternalId-v1", &CancellationToken::new()).await
        }));
    }
    let mut states = Vec::new();
    for handle in handles {
        states.push(handle.await.expect("join").expect("materialized"));
    }

    // The parse ran exactly once and every file landed where it should.
    assert_eq!(harness.sim.extract_count(), 1);
    let files = harness.dir.path().join("files");
    assert!(files.join("100/100.csv").exists());
    assert!(files.join("101/101.xml").exists());
    assert!(files.join("102/102.xml").exists());

    // All five callers observed the same state.
    for state in &states[1..] {
        assert_eq!(state, &states[0]);
    }
    assert!(states[0].processed);
    assert!(states[0].downloaded);

    // Parsing status was reported back to the control plane.
    assert!(harness.mock.calls().iter().any(|op| matches!(
        op,
        Op::UpdateParsingStatus { revision_id: 42, status: ParsingStatus::Success }
    )));
}

#[tokio::test]
async fn partial_dependency_failure() {
    let harness = library_harness(FakeClock::new());
    seed_model(&harness.mock);
    // The first download of dependency 101 answers HTTP 410.
    harness.fetcher.script("http://files.local/101.xml", FakeOutcome::Status(410));

    let state = harness
        .models
        .model_revision("TestModelExternalId-v1", &CancellationToken::new())
        .await
        .expect("state returned, not an error");

    assert!(!state.downloaded);
    assert!(!state.parsing_info.parsed);
    let dep_101 = state.dependency_files.iter().find(|d| d.file_id == 101).expect("dep 101");
    assert!(dep_101.file_path.is_none());
    let dep_102 = state.dependency_files.iter().find(|d| d.file_id == 102).expect("dep 102");
    assert!(dep_102.file_path.is_some());
}

#[tokio::test]
async fn remote_reparse_request_round_trips() {
    let harness = library_harness(FakeClock::new());
    seed_model(&harness.mock);
    let cancel = CancellationToken::new();

    harness.models.poll_once(&cancel).await.expect("first convergence");
    assert_eq!(harness.sim.extract_count(), 1);

    // The remote flips the revision back to unknown; the next convergence
    // re-parses and posts a terminal status again.
    harness.mock.set_model_revision_status("TestModelExternalId-v1", ParsingStatus::Unknown);
    harness.models.poll_once(&cancel).await.expect("second convergence");
    assert_eq!(harness.sim.extract_count(), 2);
    assert_eq!(
        harness.mock.model_revision("TestModelExternalId-v1").expect("revision").status,
        ParsingStatus::Success
    );
}

#[tokio::test]
async fn persisted_state_round_trips_through_restart() {
    let dir;
    let dep_pairs: Vec<(i64, Option<String>)>;
    {
        let harness = library_harness(FakeClock::new());
        seed_model(&harness.mock);
        harness
            .models
            .model_revision("TestModelExternalId-v1", &CancellationToken::new())
            .await
            .expect("materialized");
        harness.store.flush().expect("flush");
        dep_pairs = harness.models.states()[0]
            .dependency_files
            .iter()
            .map(|d| (d.file_id, d.arguments.get("address").cloned()))
            .collect();
        dir = harness.dir;
    }

    // A fresh store and library over the same directory.
    let store = Arc::new(sim_storage::StateStore::new(dir.path().join("state.db")));
    store.load().expect("load");
    let harness2 = {
        let mock = MockControlPlane::new();
        let sim = FakeSimulator::new();
        Arc::new(sim_library::ModelLibrary::new(
            Arc::new(mock),
            Arc::new(sim),
            Arc::new(FakeFetcher::new()),
            store,
            FakeClock::new(),
            SIMULATOR,
            sim_library::ModelLibraryConfig {
                files_directory: dir.path().join("files"),
                ..sim_library::ModelLibraryConfig::default()
            },
        ))
    };
    harness2.init().expect("init");

    let states = harness2.states();
    assert_eq!(states.len(), 1);
    let reloaded: Vec<(i64, Option<String>)> = states[0]
        .dependency_files
        .iter()
        .map(|d| (d.file_id, d.arguments.get("address").cloned()))
        .collect();
    assert_eq!(reloaded, dep_pairs);
    // Files are still on disk, so the state survived fully processed.
    assert!(states[0].processed);
}
