//! Task holder specs
//!
//! Priority preemption semantics across attached waiters.

use crate::prelude::*;
use sim_core::{ConnectorError, ErrorKind};
use sim_library::TaskHolder;
use tokio::sync::Notify;

#[tokio::test]
async fn priority_preemption() {
    let holder: TaskHolder<&'static str, u32> = TaskHolder::new();
    let gate = Arc::new(Notify::new());

    // First computation blocks on a gate that never opens.
    let first = {
        let holder = holder.clone();
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            holder
                .execute(
                    "k",
                    move |cancel| async move {
                        tokio::select! {
                            _ = gate.notified() => Ok(1),
                            _ = cancel.cancelled() => Err(ConnectorError::cancelled()),
                        }
                    },
                    &CancellationToken::new(),
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    // The priority call displaces it and completes with its own value.
    let value = holder
        .execute_priority("k", |_| async { Ok(2) }, &CancellationToken::new())
        .await
        .expect("priority result");
    assert_eq!(value, 2);

    // The displaced awaiter observes cancellation.
    let displaced = first.await.expect("join").expect_err("first must be cancelled");
    assert_eq!(displaced.kind(), ErrorKind::Cancelled);

    // No entry remains for the key.
    assert!(
        wait_until(Duration::from_secs(1), || holder.is_empty()).await,
        "holder should have no entry for the key"
    );
}
