//! Fire-and-forget work detached from the request that scheduled it.
//!
//! Cache backfills, delayed deletes and rank propagation run on the tokio runtime
//! without the caller awaiting them. Each task logs its own failure; nothing is
//! surfaced to the originating request. The in-flight count allows shutdown (and
//! tests) to wait for outstanding work.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Default)]
struct Inner {
    inflight: AtomicUsize,
    idle: Notify,
}

#[derive(Clone, Default)]
pub struct DeferredTasks {
    inner: Arc<Inner>,
}

struct InflightGuard {
    inner: Arc<Inner>,
}

impl InflightGuard {
    fn enter(inner: &Arc<Inner>) -> Self {
        let now = inner.inflight.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::gauge!("plaza_deferred_tasks_inflight").set(now as f64);
        Self {
            inner: inner.clone(),
        }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let remaining = self.inner.inflight.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::gauge!("plaza_deferred_tasks_inflight").set(remaining as f64);
        if remaining == 0 {
            self.inner.idle.notify_waiters();
        }
    }
}

impl DeferredTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` in the background, logging its error if it fails.
    pub fn spawn<F, E>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.spawn_after(name, Duration::ZERO, task);
    }

    /// Run `task` in the background once `delay` has elapsed.
    pub fn spawn_after<F, E>(&self, name: &'static str, delay: Duration, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let guard = InflightGuard::enter(&self.inner);
        tokio::spawn(async move {
            let _guard = guard;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match task.await {
                Ok(()) => debug!(target = "plaza::deferred", task = name, "deferred task done"),
                Err(err) => warn!(
                    target = "plaza::deferred",
                    task = name,
                    error = %err,
                    "deferred task failed"
                ),
            }
        });
    }

    pub fn inflight(&self) -> usize {
        self.inner.inflight.load(Ordering::Acquire)
    }

    /// Wait until every scheduled task has finished.
    pub async fn drain(&self) {
        loop {
            let idle = self.inner.idle.notified();
            if self.inflight() == 0 {
                return;
            }
            idle.await;
        }
    }
}
