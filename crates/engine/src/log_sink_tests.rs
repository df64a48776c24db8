// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sim_client::{ApiError, MockControlPlane};

fn sink(mock: &MockControlPlane) -> Arc<RemoteLogSink> {
    Arc::new(RemoteLogSink::new(Arc::new(mock.clone()), true, LogSeverity::Information))
}

#[tokio::test]
async fn flush_uploads_and_clears_the_buffer() {
    let mock = MockControlPlane::new();
    let sink = sink(&mock);
    sink.begin_scope(1, Some(500), None);
    sink.log(1, LogSeverity::Information, "claimed run", 10);
    sink.log(1, LogSeverity::Error, "boom", 20);

    sink.flush().await;

    let remote = mock.logs(500);
    assert_eq!(remote.len(), 2);
    assert_eq!(remote[0].message, "claimed run");
    assert_eq!(sink.buffered(1), 0);
}

#[tokio::test]
async fn severity_filter_is_per_scope() {
    let mock = MockControlPlane::new();
    let sink = sink(&mock);
    // Run 1 keeps the default filter; run 2 asked for Debug.
    sink.begin_scope(1, Some(501), None);
    sink.begin_scope(2, Some(502), Some(LogSeverity::Debug));

    sink.log(1, LogSeverity::Debug, "dropped", 1);
    sink.log(2, LogSeverity::Debug, "kept", 2);
    sink.flush().await;

    assert!(mock.logs(501).is_empty());
    assert_eq!(mock.logs(502).len(), 1);
}

#[tokio::test]
async fn disabled_sink_buffers_nothing() {
    let mock = MockControlPlane::new();
    let sink = RemoteLogSink::new(Arc::new(mock.clone()), false, LogSeverity::Information);
    sink.begin_scope(1, Some(500), None);
    sink.log(1, LogSeverity::Error, "x", 1);
    assert_eq!(sink.buffered(1), 0);
}

#[tokio::test]
async fn unknown_scope_is_ignored() {
    let mock = MockControlPlane::new();
    let sink = sink(&mock);
    sink.log(9, LogSeverity::Error, "x", 1);
    assert_eq!(sink.buffered(9), 0);
}

#[tokio::test]
async fn failed_flush_rebuffers_in_order() {
    let mock = MockControlPlane::new();
    let sink = sink(&mock);
    sink.begin_scope(1, Some(500), None);
    sink.log(1, LogSeverity::Information, "first", 1);
    mock.fail_once("append_logs", ApiError::Transport("reset".into()));

    sink.flush().await;
    assert_eq!(sink.buffered(1), 1);
    sink.log(1, LogSeverity::Information, "second", 2);

    sink.flush().await;
    let remote = mock.logs(500);
    assert_eq!(remote.len(), 2);
    assert_eq!(remote[0].message, "first");
    assert_eq!(remote[1].message, "second");
}

#[tokio::test]
async fn end_scope_flushes_then_drops() {
    let mock = MockControlPlane::new();
    let sink = sink(&mock);
    sink.begin_scope(1, Some(500), None);
    sink.log(1, LogSeverity::Warning, "tail", 1);

    sink.end_scope(1).await;
    assert_eq!(mock.logs(500).len(), 1);

    // Scope is gone: further entries are ignored.
    sink.log(1, LogSeverity::Error, "late", 2);
    assert_eq!(sink.buffered(1), 0);
}
