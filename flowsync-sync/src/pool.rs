//! Bounded worker pools, one per fan-out level.
//!
//! Every level (projects, agents, flows, skills) gets its own pool with its
//! own cap; the caps bound how many requests are in flight against the
//! remote API, not local CPU use. A pool stops issuing new items once the
//! run's [`CancellationToken`] fires; tasks already started race their work
//! against the token and yield [`SyncError::Cancelled`] if it wins.
//!
//! Item failures never stop the pool. They are returned for the caller to
//! aggregate.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;

pub const PROJECTS: usize = 4;
pub const AGENTS: usize = 8;
pub const FLOWS: usize = 8;
pub const SKILLS: usize = 16;

/// Cap for the flow-level phases of a push (metadata regeneration and
/// republishing): `min(pending, min(cpu count, 4))`, at least 1.
pub fn flow_phase_limit(pending: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    pending.min(cpus.min(4)).max(1)
}

#[derive(Debug, Clone)]
pub struct Pool {
    limit: usize,
    cancel: CancellationToken,
}

impl Pool {
    pub fn new(limit: usize, cancel: CancellationToken) -> Self {
        Self {
            limit: limit.max(1),
            cancel,
        }
    }

    /// Run `work` over every item with at most `limit` in flight.
    ///
    /// Returns the failures, in completion order. Items never issued because
    /// of cancellation are reported as a single [`SyncError::Cancelled`].
    pub async fn run<T, F, Fut>(&self, items: Vec<T>, work: F) -> Vec<SyncError>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<(), SyncError>> + Send + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.limit));
        let mut tasks = JoinSet::new();
        let mut failures = Vec::new();
        let mut cut_short = false;

        for item in items {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = permits.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                cut_short = true;
                break;
            };
            let cancel = self.cancel.clone();
            let fut = work(item);
            tasks.spawn(async move {
                let _permit = permit;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(SyncError::Cancelled),
                    result = fut => result,
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => failures.push(err),
                Err(err) => failures.push(SyncError::Join(err.to_string())),
            }
        }
        if cut_short {
            failures.push(SyncError::Cancelled);
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn flow_phase_limit_bounds() {
        assert_eq!(flow_phase_limit(0), 1);
        assert_eq!(flow_phase_limit(1), 1);
        assert!(flow_phase_limit(100) <= 4);
    }

    #[tokio::test]
    async fn never_exceeds_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let pool = Pool::new(3, CancellationToken::new());

        let failures = pool
            .run((0..20).collect(), |_: usize| {
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(failures.is_empty());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn failures_are_collected_not_fatal() {
        let done = Arc::new(AtomicUsize::new(0));
        let pool = Pool::new(2, CancellationToken::new());
        let failures = pool
            .run((0..6).collect(), |i: usize| {
                let done = done.clone();
                async move {
                    done.fetch_add(1, Ordering::SeqCst);
                    if i % 2 == 0 {
                        Err(SyncError::structural(format!("item-{i}"), "bad"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        assert_eq!(failures.len(), 3);
        assert_eq!(done.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn cancelled_pool_issues_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ran = Arc::new(AtomicUsize::new(0));
        let pool = Pool::new(4, cancel);
        let failures = pool
            .run(vec![1, 2, 3], |_: i32| {
                let ran = ran.clone();
                async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(matches!(failures.as_slice(), [SyncError::Cancelled]));
    }

    #[tokio::test]
    async fn in_flight_task_observes_cancellation() {
        let cancel = CancellationToken::new();
        let pool = Pool::new(1, cancel.clone());
        let trigger = cancel.clone();
        let failures = pool
            .run(vec![()], move |_| {
                let trigger = trigger.clone();
                async move {
                    trigger.cancel();
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
            })
            .await;
        assert!(matches!(failures.as_slice(), [SyncError::Cancelled]));
    }
}
