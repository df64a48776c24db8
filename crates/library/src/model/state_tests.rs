// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn revision(file_id: i64, updated: i64) -> ModelRevision {
    ModelRevision {
        id: 7,
        external_id: "rev-1".into(),
        model_external_id: "model".into(),
        simulator_external_id: "sim".into(),
        data_set_id: 1,
        file_id,
        created_time: 0,
        last_updated_time: updated,
        version_number: 1,
        log_id: None,
        status: ParsingStatus::Unknown,
        status_message: None,
        external_dependencies: vec![DependencyFile {
            file_id: 101,
            arguments: [("address".to_string(), "a.b.c".to_string())].into(),
        }],
    }
}

#[test]
fn fresh_state_needs_processing() {
    let state = LocalModelState::new(revision(100, 1));
    assert!(state.needs_processing(3));
    assert!(!state.processed);
    assert!(state.can_read);
    assert_eq!(state.dependency_files.len(), 1);
    assert_eq!(state.dependency_files[0].file_id, 101);
}

#[test]
fn exhausted_download_attempts_stop_processing() {
    let mut state = LocalModelState::new(revision(100, 1));
    state.download_attempts = 3;
    assert!(!state.needs_processing(3));
    assert!(state.needs_processing(4));
}

#[test]
fn unchanged_remote_record_is_a_no_op() {
    let mut state = LocalModelState::new(revision(100, 1));
    assert!(!state.apply_remote(revision(100, 1)));
}

#[test]
fn remote_unknown_after_terminal_resets_the_state() {
    let mut state = LocalModelState::new(revision(100, 1));
    state.processed = true;
    state.can_read = false;
    state.download_attempts = 2;
    state.parsing_info =
        ParsingInfo { parsed: false, status: ParsingStatus::Failure, message: Some("x".into()) };

    // Remote flips back to unknown: re-open for processing.
    assert!(state.apply_remote(revision(100, 1)));
    assert!(!state.processed);
    assert!(state.can_read);
    assert_eq!(state.download_attempts, 0);
    assert_eq!(state.parsing_info.status, ParsingStatus::Unknown);
}

#[test]
fn changed_primary_file_forces_redownload() {
    let mut state = LocalModelState::new(revision(100, 1));
    state.file_path = Some("/tmp/100.csv".into());
    state.extension = Some("csv".into());
    state.processed = true;
    state.parsing_info.status = ParsingStatus::Success;

    assert!(state.apply_remote(revision(200, 2)));
    assert!(state.file_path.is_none());
    assert!(state.extension.is_none());
    assert!(!state.processed);
    assert_eq!(state.revision.file_id, 200);
}

#[test]
fn surviving_dependency_keeps_its_path() {
    let mut state = LocalModelState::new(revision(100, 1));
    state.dependency_files[0].file_path = Some("/tmp/101.xml".into());

    let mut remote = revision(100, 2);
    remote.external_dependencies.push(DependencyFile { file_id: 102, arguments: HashMap::new() });
    assert!(state.apply_remote(remote));

    assert_eq!(state.dependency_files.len(), 2);
    assert_eq!(state.dependency_files[0].file_path, Some("/tmp/101.xml".into()));
    assert!(state.dependency_files[1].file_path.is_none());
}

#[test]
fn validate_files_demotes_when_primary_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let present = dir.path().join("100.csv");
    std::fs::write(&present, b"x").unwrap();

    let mut state = LocalModelState::new(revision(100, 1));
    state.file_path = Some(present.clone());
    state.processed = true;
    state.downloaded = true;
    assert!(!state.validate_files());
    assert!(state.processed);

    std::fs::remove_file(&present).unwrap();
    assert!(state.validate_files());
    assert!(state.file_path.is_none());
    assert!(!state.processed);
    assert!(!state.downloaded);
}

#[test]
fn model_files_requires_the_primary() {
    let mut state = LocalModelState::new(revision(100, 1));
    assert!(state.model_files().is_none());
    state.file_path = Some("/tmp/100.csv".into());
    let files = state.model_files().unwrap();
    assert_eq!(files.dependencies.len(), 1);
    assert_eq!(files.dependencies[0].arguments.get("address").map(String::as_str), Some("a.b.c"));
}
