// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn model_revision_tolerates_missing_optional_fields() {
    let json = r#"{
        "id": 42,
        "externalId": "TestModelExternalId-v1",
        "modelExternalId": "TestModel",
        "simulatorExternalId": "TestSim",
        "dataSetId": 7,
        "fileId": 100,
        "createdTime": 1,
        "lastUpdatedTime": 2,
        "versionNumber": 1
    }"#;
    let rev: ModelRevision = serde_json::from_str(json).unwrap();
    assert_eq!(rev.status, ParsingStatus::Unknown);
    assert!(rev.external_dependencies.is_empty());
    assert!(rev.log_id.is_none());
}

#[test]
fn dependency_arguments_round_trip() {
    let json = r#"{"fileId": 101, "arguments": {"address": "test.address.1"}}"#;
    let dep: DependencyFile = serde_json::from_str(json).unwrap();
    assert_eq!(dep.file_id, 101);
    assert_eq!(dep.arguments.get("address").map(String::as_str), Some("test.address.1"));
    let back = serde_json::to_value(&dep).unwrap();
    assert_eq!(back["fileId"], 101);
}

#[parameterized(
    double = { r#"3.25"#, Some(3.25) },
    int_as_double = { r#"142"#, Some(142.0) },
    numeric_string = { r#""142.5""#, Some(142.5) },
    padded_string = { r#"" 7 ""#, Some(7.0) },
    word = { r#""abc""#, None },
)]
fn input_value_coercion(json: &str, expected: Option<f64>) {
    let v: InputValue = serde_json::from_str(json).unwrap();
    assert_eq!(v.as_f64(), expected);
}

#[test]
fn run_callback_skips_empty_sections() {
    let cb = RunCallback {
        id: 9,
        status: RunStatus::Success,
        status_message: None,
        simulation_time: Some(123),
        inputs: vec![],
        outputs: vec![],
    };
    let v = serde_json::to_value(&cb).unwrap();
    assert!(v.get("inputs").is_none());
    assert!(v.get("statusMessage").is_none());
    assert_eq!(v["simulationTime"], 123);
}

#[test]
fn routine_config_defaults_are_empty() {
    let cfg: RoutineConfig = serde_json::from_str("{}").unwrap();
    assert!(cfg.inputs.is_empty());
    assert!(cfg.schedule.is_none());
    assert!(cfg.log_level.is_none());
}

#[test]
fn run_status_terminality() {
    assert!(RunStatus::Success.is_terminal());
    assert!(RunStatus::Failure.is_terminal());
    assert!(!RunStatus::Ready.is_terminal());
    assert!(!RunStatus::Running.is_terminal());
}
