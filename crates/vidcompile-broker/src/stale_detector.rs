//! Stale-Job Detector (C7): periodic scan that re-dispatches jobs whose
//! broker task is missing or failed. The broker may silently drop tasks
//! during restarts; this is the at-least-once safety net (§4.6).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use vidcompile_store::{JobPatch, JobStore};

use crate::client::{Broker, BrokerTaskState};
use crate::dispatcher::classify_job;

pub struct StaleJobDetector<B: Broker> {
    store: Arc<JobStore>,
    broker: Arc<B>,
    poll_interval: Duration,
    stale_age: Duration,
}

impl<B: Broker> StaleJobDetector<B> {
    pub fn new(store: Arc<JobStore>, broker: Arc<B>, poll_interval: Duration, stale_age: Duration) -> Self {
        Self { store, broker, poll_interval, stale_age }
    }

    /// Runs the scan loop until `shutdown` reports `true`. Intended to be
    /// spawned once at startup, matching the "background task listening
    /// on a shutdown signal" pattern used across the service's long-lived
    /// tasks (§9).
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_once().await {
                        tracing::warn!(error = %e, "stale-job scan failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("stale-job detector shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub async fn scan_once(&self) -> Result<usize, vidcompile_store::StoreError> {
        let candidates = self.store.list_stale_candidates(self.stale_age.as_secs() as i64).await?;
        let mut redispatched = 0usize;

        for job in candidates {
            let Some(task_id) = job.task_id.clone() else { continue };
            let state = match self.broker.task_state(&task_id).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "failed to inspect broker task state");
                    continue;
                }
            };

            if !matches!(state, BrokerTaskState::Failure | BrokerTaskState::Unknown) {
                continue;
            }

            let items = self.store.get_items(job.id).await?;
            let queue = classify_job(&job, &items);
            match self.broker.enqueue(queue, job.id).await {
                Ok(new_task_id) => {
                    self.store.apply_patch(job.id, JobPatch::SetTaskId(new_task_id)).await?;
                    redispatched += 1;
                    tracing::info!(job_id = %job.id, "re-dispatched stale job");
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "re-dispatch attempt failed");
                }
            }
        }

        Ok(redispatched)
    }
}
