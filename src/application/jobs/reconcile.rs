//! Periodic reconciliation of live view counters.
//!
//! Each pass snapshots every live counter, persists the snapshot to the
//! durable store in one bulk write, then rebuilds the view index from the same
//! snapshot. A failed persist skips the rebuild for that pass.

use std::sync::Arc;
use std::time::Duration;

use plaza_api_types::ReconcileSummary;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::application::engine::Engine;
use crate::application::error::AppError;
use crate::application::repos::PostsWriteRepo;
use crate::ranking::{RankingStore, ViewCounter};

const SOURCE: &str = "application::jobs::reconcile";

#[derive(Clone)]
pub struct ReconciliationService {
    views: ViewCounter,
    ranking: RankingStore,
    writer: Arc<dyn PostsWriteRepo>,
    running: Arc<Mutex<()>>,
}

impl ReconciliationService {
    pub fn new(engine: &Engine, writer: Arc<dyn PostsWriteRepo>) -> Self {
        Self {
            views: engine.views.clone(),
            ranking: engine.ranking.clone(),
            writer,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Run one pass. Passes never overlap; a caller arriving mid-pass waits.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<ReconcileSummary, AppError> {
        let _pass = self.running.lock().await;
        let started = Instant::now();
        let result = self.reconcile().await;

        let outcome = match &result {
            Ok(summary) if summary.index_rebuilt => "ok",
            Ok(_) => "partial",
            Err(_) => "failed",
        };
        metrics::counter!("plaza_reconcile_runs_total", "outcome" => outcome).increment(1);
        metrics::histogram!("plaza_reconcile_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        result
    }

    /// On-demand pass requested by an operator.
    pub async fn trigger_manual(&self) -> Result<ReconcileSummary, AppError> {
        info!(target = SOURCE, "manual reconciliation requested");
        self.run_once().await
    }

    /// Re-derive the view index from live counters. The durable store is not
    /// touched. Returns how many posts were re-ranked.
    #[instrument(skip(self))]
    pub async fn rebuild_view_index(&self) -> Result<usize, AppError> {
        let _pass = self.running.lock().await;
        let snapshot = self.views.snapshot().await?;
        let ranked = self.ranking.rebuild_view_index(&snapshot).await?;
        info!(target = SOURCE, ranked, "view index rebuilt from live counters");
        Ok(ranked)
    }

    async fn reconcile(&self) -> Result<ReconcileSummary, AppError> {
        let snapshot = self.views.snapshot().await?;
        if snapshot.is_empty() {
            debug!(target = SOURCE, "no live view counters");
            return Ok(ReconcileSummary {
                counters: 0,
                persisted: true,
                index_rebuilt: true,
            });
        }

        let rows = match self.writer.bulk_update_view_counts(&snapshot).await {
            Ok(rows) => rows,
            Err(err) => {
                error!(
                    target = SOURCE,
                    counters = snapshot.len(),
                    error = %err,
                    "persisting view counts failed; view index left untouched"
                );
                return Err(err.into());
            }
        };

        let index_rebuilt = match self.ranking.rebuild_view_index(&snapshot).await {
            Ok(_) => true,
            Err(err) => {
                warn!(target = SOURCE, error = %err, "view index rebuild failed");
                false
            }
        };

        info!(
            target = SOURCE,
            counters = snapshot.len(),
            rows,
            index_rebuilt,
            "view counts reconciled"
        );
        Ok(ReconcileSummary {
            counters: snapshot.len(),
            persisted: true,
            index_rebuilt,
        })
    }

    /// Run a pass every `interval`, starting one interval from now. Abort the
    /// handle to stop.
    pub fn spawn_periodic(&self, interval: Duration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Skip the first immediate tick
            loop {
                ticker.tick().await;
                if let Err(err) = service.run_once().await {
                    warn!(target = SOURCE, error = %err, "scheduled reconciliation failed");
                }
            }
        })
    }
}
