//! Scheduler specs
//!
//! Scheduled run emission at an accelerated cadence.

use crate::prelude::*;
use sim_engine::{Scheduler, SchedulerConfig};

#[tokio::test]
async fn scheduled_run_emission_rate() {
    // Every sleep takes one real second, however long the cron delay, so a
    // once-per-second schedule fires about once per wall-clock second.
    let clock = FakeClock::accelerated(Duration::from_secs(1));
    let harness = library_harness(clock.clone());
    harness.mock.seed_routine_revision(test_routine_revision(Some("*/1 * * * * *")));
    harness.routines.init(&CancellationToken::new()).await.expect("routine init");

    let scheduler = Arc::new(Scheduler::new(
        Arc::new(harness.mock.clone()),
        Arc::clone(&harness.routines),
        clock,
        SchedulerConfig::default(),
    ));

    let cancel = CancellationToken::new();
    let mut tasks = scheduler.run_tasks(cancel.clone());
    let handle = tokio::spawn(tasks.remove(0));

    tokio::time::sleep(Duration::from_secs(5)).await;
    cancel.cancel();
    handle.await.expect("join").expect("scheduler exits cleanly");

    let runs = harness.mock.runs();
    assert!(
        (4..=6).contains(&runs.len()),
        "expected 4-6 scheduled runs in 5 seconds, got {}",
        runs.len()
    );
    for run in &runs {
        assert_eq!(run.run_type, RunType::Scheduled);
        assert!(run.run_time.is_some());
    }
}
