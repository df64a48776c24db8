//! Supervised restart specs
//!
//! A control plane answering 410 on everything forces repeated supervised
//! restarts, with the documented log lines.

use crate::prelude::*;

#[tokio::test(flavor = "current_thread")]
async fn supervised_restart_on_gone_control_plane() {
    let capture = LogCapture::default();
    let _guard = capture.install();

    let harness = connector_harness(FakeClock::new());
    harness.mock.fail_all_with_status(410);

    let root = CancellationToken::new();
    let run_root = root.clone();
    let runtime = Arc::clone(&harness.runtime);
    let run = tokio::spawn(async move { runtime.run(run_root).await });

    // The fake clock collapses the 10 s restart delay, so several cycles
    // fit comfortably inside the spec's 30 s budget.
    let restarted = wait_until(Duration::from_secs(10), || harness.runtime.restarts() >= 2).await;
    assert!(restarted, "expected at least two restarts, got {}", harness.runtime.restarts());

    root.cancel();
    run.await.expect("join").expect("graceful stop");

    assert!(
        capture.occurrences("Request to CDF failed with code 410") >= 2,
        "captured logs:\n{}",
        capture.contents()
    );
    assert!(
        capture.occurrences("Restarting connector in 10 seconds") >= 2,
        "captured logs:\n{}",
        capture.contents()
    );

    // Every cycle re-probed the control plane.
    let probes =
        harness.mock.calls().iter().filter(|op| matches!(op, Op::TokenInspect)).count();
    assert!(probes >= 3);
}

#[tokio::test]
async fn healthy_connector_executes_a_seeded_run_end_to_end() {
    let harness = connector_harness(FakeClock::new());
    seed_model(&harness.mock);
    harness.mock.seed_routine_revision(test_routine_revision(None));
    harness.mock.seed_run(ready_run(900));

    let root = CancellationToken::new();
    let run_root = root.clone();
    let runtime = Arc::clone(&harness.runtime);
    let run = tokio::spawn(async move { runtime.run(run_root).await });

    let finished = wait_until(Duration::from_secs(10), || {
        harness.mock.runs().iter().any(|r| r.id == 900 && r.status == RunStatus::Success)
    })
    .await;
    assert!(finished, "run never succeeded under the full runtime");

    // Liveness was published along the way.
    assert!(harness
        .mock
        .calls()
        .iter()
        .any(|op| matches!(op, Op::UpdateIntegration { .. })));

    root.cancel();
    run.await.expect("join").expect("graceful stop");
    assert!(harness.sim.calls().contains(&DriverCall::PreShutdown));
}
