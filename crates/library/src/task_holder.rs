// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-key deduplication of in-flight asynchronous work.
//!
//! `execute` guarantees at-most-one running factory per key: a call that
//! finds a live entry attaches to it and observes the same outcome the
//! factory produces, value or error. The entry is removed from the registry
//! *before* the outcome is delivered, so a caller arriving just as a
//! computation completes either attaches to the still-registered entry or
//! starts a fresh one; it can never attach to a finished entry.

use parking_lot::Mutex;
use sim_core::{ConnectorError, ErrorKind};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;

type Outcome<V> = Result<V, ConnectorError>;

#[derive(Debug)]
struct Entry<V> {
    rx: watch::Receiver<Option<Outcome<V>>>,
    cancel: CancellationToken,
    /// Identifies the owning computation; a priority replacement bumps this
    /// so the displaced task's cleanup cannot remove the new entry.
    generation: u64,
}

#[derive(Debug)]
struct Registry<K, V> {
    entries: HashMap<K, Entry<V>>,
    next_generation: u64,
    disposed: bool,
}

/// Deduplicating asynchronous task registry.
///
/// `K` is the deduplication key, `V` the (cloneable) result shared with
/// every waiter.
#[derive(Debug)]
pub struct TaskHolder<K, V> {
    registry: Arc<Mutex<Registry<K, V>>>,
    /// Gate on concurrently *running* factories, shared across keys.
    /// Attached waiters never hold a permit.
    permits: Option<Arc<Semaphore>>,
}

impl<K, V> Clone for TaskHolder<K, V> {
    fn clone(&self) -> Self {
        Self { registry: Arc::clone(&self.registry), permits: self.permits.clone() }
    }
}

impl<K, V> Default for TaskHolder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TaskHolder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                entries: HashMap::new(),
                next_generation: 0,
                disposed: false,
            })),
            permits: None,
        }
    }

    /// A holder whose running factories are capped at `max_concurrent`
    /// across all keys.
    pub fn with_limit(max_concurrent: usize) -> Result<Self, ConnectorError> {
        if max_concurrent == 0 {
            return Err(ConnectorError::invalid_argument(
                "max_concurrent must be greater than zero",
            ));
        }
        Ok(Self { permits: Some(Arc::new(Semaphore::new(max_concurrent))), ..Self::new() })
    }

    /// Run `factory` for `key`, or attach to the computation already in
    /// flight for it.
    ///
    /// The factory receives a token derived from `cancel`; cancelling the
    /// starter cancels the computation and every attached waiter observes
    /// the `Cancelled` outcome. Cancelling an attached waiter's `cancel`
    /// only abandons that waiter's wait.
    pub async fn execute<F, Fut>(
        &self,
        key: K,
        factory: F,
        cancel: &CancellationToken,
    ) -> Outcome<V>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Outcome<V>> + Send + 'static,
    {
        self.execute_inner(key, factory, cancel, false).await
    }

    /// Displace any in-flight computation for `key` and start a fresh one.
    ///
    /// The displaced factory's token is cancelled; its waiters observe
    /// whatever outcome it settles with (normally `Cancelled`).
    pub async fn execute_priority<F, Fut>(
        &self,
        key: K,
        factory: F,
        cancel: &CancellationToken,
    ) -> Outcome<V>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Outcome<V>> + Send + 'static,
    {
        self.execute_inner(key, factory, cancel, true).await
    }

    async fn execute_inner<F, Fut>(
        &self,
        key: K,
        factory: F,
        cancel: &CancellationToken,
        priority: bool,
    ) -> Outcome<V>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Outcome<V>> + Send + 'static,
    {
        let mut rx = {
            let mut registry = self.registry.lock();
            if registry.disposed {
                return Err(ConnectorError::new(
                    ErrorKind::Disposed,
                    "task holder is disposed",
                ));
            }

            let attach = match registry.entries.get(&key) {
                Some(existing) if !priority => Some(existing.rx.clone()),
                Some(existing) => {
                    // Displace: cancel the running computation, then replace
                    // its entry under this same lock.
                    existing.cancel.cancel();
                    None
                }
                None => None,
            };

            match attach {
                Some(rx) => rx,
                None => {
                    let generation = registry.next_generation;
                    registry.next_generation += 1;
                    let (tx, rx) = watch::channel(None);
                    let token = cancel.child_token();
                    registry.entries.insert(
                        key.clone(),
                        Entry { rx: rx.clone(), cancel: token.clone(), generation },
                    );
                    self.spawn_factory(key.clone(), generation, factory(token.clone()), token, tx);
                    rx
                }
            }
        };

        // Wait for the outcome; an attached waiter's own cancel only
        // abandons the wait.
        tokio::select! {
            changed = rx.wait_for(|outcome| outcome.is_some()) => match changed {
                Ok(outcome) => match outcome.as_ref() {
                    Some(result) => result.clone(),
                    None => Err(ConnectorError::internal("task settled without outcome")),
                },
                // Sender dropped without sending: the factory task aborted.
                Err(_) => Err(ConnectorError::internal("task aborted before completion")),
            },
            _ = cancel.cancelled() => Err(ConnectorError::cancelled()),
        }
    }

    fn spawn_factory<Fut>(
        &self,
        key: K,
        generation: u64,
        fut: Fut,
        token: CancellationToken,
        tx: watch::Sender<Option<Outcome<V>>>,
    ) where
        Fut: Future<Output = Outcome<V>> + Send + 'static,
    {
        let registry = Arc::clone(&self.registry);
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let outcome = run_gated(fut, &token, permits).await;

            // Cleanup before delivery: a late arrival either attaches while
            // the entry is still present or starts fresh after this removal.
            {
                let mut registry = registry.lock();
                let owned = registry
                    .entries
                    .get(&key)
                    .is_some_and(|entry| entry.generation == generation);
                if owned {
                    registry.entries.remove(&key);
                }
            }

            let _ = tx.send(Some(outcome));
        });
    }

    /// Stop accepting work. In-flight factories run to completion; further
    /// `execute` calls fail with `Disposed`. Idempotent.
    pub fn dispose(&self) {
        self.registry.lock().disposed = true;
    }

    /// Number of live entries (test visibility).
    pub fn len(&self) -> usize {
        self.registry.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run the factory future behind the optional concurrency gate, honoring
/// cancellation both while queued for a permit and while running.
async fn run_gated<V, Fut>(
    fut: Fut,
    token: &CancellationToken,
    permits: Option<Arc<Semaphore>>,
) -> Outcome<V>
where
    Fut: Future<Output = Outcome<V>>,
{
    let _permit = match permits {
        Some(semaphore) => {
            tokio::select! {
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => return Err(ConnectorError::internal("task gate closed")),
                },
                _ = token.cancelled() => return Err(ConnectorError::cancelled()),
            }
        }
        None => None,
    };

    tokio::select! {
        outcome = fut => outcome,
        _ = token.cancelled() => Err(ConnectorError::cancelled()),
    }
}

#[cfg(test)]
#[path = "task_holder_tests.rs"]
mod tests;
