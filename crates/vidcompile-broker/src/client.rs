//! [`Broker`]: the typed dispatch interface behind which a transport (Redis,
//! in the only implementation this crate ships) is hidden. Celery's
//! `AsyncResult` polling becomes [`BrokerTaskState`], a closed sum type.

use async_trait::async_trait;
use uuid::Uuid;

use vidcompile_core::model::Queue;

use crate::error::BrokerError;

/// The observable lifecycle state of a dispatched task, as reported by the
/// broker. `Unknown` covers both "never existed" and "broker forgot it" —
/// the Stale-Job Detector treats both as grounds for re-dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerTaskState {
    Pending,
    Started,
    Success,
    Failure,
    Unknown,
}

/// Transport-agnostic broker operations the Dispatcher and Stale-Job
/// Detector depend on.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Enqueues `job_id` onto `queue` and returns the broker-assigned task id.
    async fn enqueue(&self, queue: Queue, job_id: Uuid) -> Result<String, BrokerError>;

    /// Forces a round-trip with the broker to confirm the connection is
    /// live and the enqueue was actually accepted (not just buffered
    /// client-side).
    async fn confirm_delivery(&self, task_id: &str) -> Result<(), BrokerError>;

    async fn task_state(&self, task_id: &str) -> Result<BrokerTaskState, BrokerError>;

    /// Task ids currently reserved (claimed but not yet finished) by a
    /// named worker, in reservation order.
    async fn reserved_tasks(&self, worker_name: &str) -> Result<Vec<String>, BrokerError>;

    /// Revokes a task; `terminate` additionally asks the broker to signal
    /// the in-flight worker process if one is executing it.
    async fn revoke(&self, task_id: &str, terminate: bool) -> Result<(), BrokerError>;

    /// Pops the next task for `queue` onto `worker_name`'s reservation
    /// list and returns `(task_id, job_id)`, or `None` if the queue is
    /// empty.
    async fn reserve_next(&self, queue: Queue, worker_name: &str) -> Result<Option<(String, Uuid)>, BrokerError>;

    /// Marks a reserved task finished and drops it from the worker's
    /// reservation list.
    async fn complete(&self, task_id: &str, worker_name: &str, success: bool) -> Result<(), BrokerError>;

    /// Looks up the job id a reserved task id was enqueued for, without
    /// otherwise touching its reservation — used by the prefetch probe to
    /// resolve the worker's second reserved task (§4.11 step 0).
    async fn job_id_for_task(&self, task_id: &str) -> Result<Option<Uuid>, BrokerError>;
}
