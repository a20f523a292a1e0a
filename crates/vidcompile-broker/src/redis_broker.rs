//! Redis-backed [`Broker`] implementation. Three queues are Redis lists
//! (`vidcompile:queue:<name>`); per-task state lives in a hash
//! (`vidcompile:task:<id>`); per-worker reservations are a list
//! (`vidcompile:reserved:<worker>`) populated by [`RedisBroker::reserve_next`].

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use vidcompile_core::model::Queue;

use crate::client::{Broker, BrokerTaskState};
use crate::error::BrokerError;

fn queue_key(queue: Queue) -> String {
    format!("vidcompile:queue:{}", queue.as_str())
}

fn task_key(task_id: &str) -> String {
    format!("vidcompile:task:{task_id}")
}

fn reserved_key(worker_name: &str) -> String {
    format!("vidcompile:reserved:{worker_name}")
}

fn state_to_str(state: BrokerTaskState) -> &'static str {
    match state {
        BrokerTaskState::Pending => "pending",
        BrokerTaskState::Started => "started",
        BrokerTaskState::Success => "success",
        BrokerTaskState::Failure => "failure",
        BrokerTaskState::Unknown => "unknown",
    }
}

fn state_from_str(s: &str) -> BrokerTaskState {
    match s {
        "pending" => BrokerTaskState::Pending,
        "started" => BrokerTaskState::Started,
        "success" => BrokerTaskState::Success,
        "failure" => BrokerTaskState::Failure,
        _ => BrokerTaskState::Unknown,
    }
}

#[derive(Clone)]
pub struct RedisBroker {
    conn: ConnectionManager,
}

impl RedisBroker {
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn enqueue(&self, queue: Queue, job_id: Uuid) -> Result<String, BrokerError> {
        let task_id = Uuid::new_v4().to_string();
        let mut conn = self.conn.clone();
        let _: () = conn
            .hset_multiple(
                task_key(&task_id),
                &[("job_id", job_id.to_string()), ("state", state_to_str(BrokerTaskState::Pending).to_string())],
            )
            .await?;
        let _: i64 = conn.lpush(queue_key(queue), &task_id).await?;
        Ok(task_id)
    }

    async fn confirm_delivery(&self, task_id: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(task_key(task_id)).await?;
        if !exists {
            return Err(BrokerError::UnknownTask(task_id.to_string()));
        }
        Ok(())
    }

    async fn task_state(&self, task_id: &str) -> Result<BrokerTaskState, BrokerError> {
        let mut conn = self.conn.clone();
        let state: Option<String> = conn.hget(task_key(task_id), "state").await?;
        Ok(state.map(|s| state_from_str(&s)).unwrap_or(BrokerTaskState::Unknown))
    }

    async fn reserved_tasks(&self, worker_name: &str) -> Result<Vec<String>, BrokerError> {
        let mut conn = self.conn.clone();
        Ok(conn.lrange(reserved_key(worker_name), 0, -1).await?)
    }

    async fn revoke(&self, task_id: &str, terminate: bool) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        if terminate {
            let _: () = conn.hset(task_key(task_id), "state", "revoked").await?;
        }
        for queue in [Queue::DefaultQueue, Queue::GpuQueue, Queue::FourKQueue] {
            let _: i64 = conn.lrem(queue_key(queue), 0, task_id).await?;
        }
        Ok(())
    }

    /// Pops the next task id for `queue` and moves it onto the worker's
    /// reservation list, mirroring the broker's `reserved-task` listing
    /// contract (§4.11 step 0). Returns `None` when the queue is empty.
    async fn reserve_next(&self, queue: Queue, worker_name: &str) -> Result<Option<(String, Uuid)>, BrokerError> {
        let mut conn = self.conn.clone();
        let task_id: Option<String> = conn
            .rpoplpush(queue_key(queue), reserved_key(worker_name))
            .await?;
        let Some(task_id) = task_id else { return Ok(None) };

        let job_id_str: Option<String> = conn.hget(task_key(&task_id), "job_id").await?;
        let _: () = conn.hset(task_key(&task_id), "state", state_to_str(BrokerTaskState::Started)).await?;
        match job_id_str.and_then(|s| Uuid::parse_str(&s).ok()) {
            Some(job_id) => Ok(Some((task_id, job_id))),
            None => Err(BrokerError::UnknownTask(task_id)),
        }
    }

    async fn complete(&self, task_id: &str, worker_name: &str, success: bool) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let state = if success { BrokerTaskState::Success } else { BrokerTaskState::Failure };
        let _: () = conn.hset(task_key(task_id), "state", state_to_str(state)).await?;
        let _: i64 = conn.lrem(reserved_key(worker_name), 1, task_id).await?;
        Ok(())
    }

    async fn job_id_for_task(&self, task_id: &str) -> Result<Option<Uuid>, BrokerError> {
        let mut conn = self.conn.clone();
        let job_id_str: Option<String> = conn.hget(task_key(task_id), "job_id").await?;
        Ok(job_id_str.and_then(|s| Uuid::parse_str(&s).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_str() {
        for s in [BrokerTaskState::Pending, BrokerTaskState::Started, BrokerTaskState::Success, BrokerTaskState::Failure] {
            assert_eq!(state_from_str(state_to_str(s)), s);
        }
    }

    #[test]
    fn unrecognized_state_string_is_unknown() {
        assert_eq!(state_from_str("revoked"), BrokerTaskState::Unknown);
    }

    #[test]
    fn keys_are_namespaced_per_queue_and_worker() {
        assert_eq!(queue_key(Queue::GpuQueue), "vidcompile:queue:gpu_queue");
        assert_eq!(reserved_key("worker-1"), "vidcompile:reserved:worker-1");
    }
}
