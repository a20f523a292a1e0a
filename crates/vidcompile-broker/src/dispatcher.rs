//! Dispatcher (C6): classifies a ready job into one of three queues and
//! submits it with delivery confirmation and bounded retry.

use std::sync::Arc;
use std::time::Duration;

use vidcompile_core::classify::classify_queue;
use vidcompile_core::model::{ItemType, Job, JobItem, Queue};
use vidcompile_store::{JobPatch, JobStore};

use crate::client::Broker;
use crate::error::BrokerError;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Classifies a job's queue lane from its items, per §4.5.
pub fn classify_job(job: &Job, items: &[JobItem]) -> Queue {
    let video_count = items.iter().filter(|i| i.item_type == ItemType::Video).count() as u32;
    let has_text_animation = items.iter().any(|i| i.text_animation_text.as_deref().is_some_and(|t| !t.is_empty()));
    classify_queue(job.enable_4k, video_count, has_text_animation)
}

pub struct Dispatcher<B: Broker> {
    store: Arc<JobStore>,
    broker: Arc<B>,
}

impl<B: Broker> Dispatcher<B> {
    pub fn new(store: Arc<JobStore>, broker: Arc<B>) -> Self {
        Self { store, broker }
    }

    /// Enqueues `job`, confirming delivery and retrying up to
    /// [`MAX_ATTEMPTS`] times on a recoverable broker error. On final
    /// failure the job is marked failed and the error is re-raised. On
    /// success the broker-assigned task id is written onto the job row.
    pub async fn dispatch(&self, job: &Job, items: &[JobItem]) -> Result<(Queue, String), BrokerError> {
        let queue = classify_job(job, items);

        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_submit(queue, job.id).await {
                Ok(task_id) => {
                    self.store.apply_patch(job.id, JobPatch::SetTaskId(task_id.clone())).await?;
                    return Ok((queue, task_id));
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, attempt, error = %e, "broker submission attempt failed");
                    last_error = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }

        let error = last_error.expect("loop runs at least once");
        let _ = self
            .store
            .apply_patch(job.id, JobPatch::Fail { error_message: format!("failed to dispatch job: {error}") })
            .await;
        Err(error)
    }

    async fn try_submit(&self, queue: Queue, job_id: uuid::Uuid) -> Result<String, BrokerError> {
        let task_id = self.broker.enqueue(queue, job_id).await?;
        self.broker.confirm_delivery(&task_id).await?;
        Ok(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use vidcompile_core::model::ItemType;

    fn item(item_type: ItemType, text: Option<&str>) -> JobItem {
        let mut i = JobItem::new(Uuid::new_v4(), 1, item_type, "/tmp/a.mp4");
        i.text_animation_text = text.map(|s| s.to_string());
        i
    }

    #[test]
    fn classify_counts_only_video_items() {
        let job = Job::new(Uuid::new_v4(), "demo");
        let items = vec![
            item(ItemType::Intro, None),
            item(ItemType::Video, None),
            item(ItemType::Video, None),
            item(ItemType::Outro, None),
        ];
        assert_eq!(classify_job(&job, &items), Queue::DefaultQueue);
    }

    #[test]
    fn classify_detects_non_empty_text_animation() {
        let job = Job::new(Uuid::new_v4(), "demo");
        let items = vec![item(ItemType::Video, Some("hello"))];
        assert_eq!(classify_job(&job, &items), Queue::GpuQueue);
    }

    #[test]
    fn classify_ignores_empty_text_animation_string() {
        let job = Job::new(Uuid::new_v4(), "demo");
        let items = vec![item(ItemType::Video, Some(""))];
        assert_eq!(classify_job(&job, &items), Queue::DefaultQueue);
    }
}
