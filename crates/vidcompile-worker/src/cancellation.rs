//! Bridges the job row's `status` column — the single cross-process
//! synchronization point (§5) — into the synchronous cancellation checks
//! the Copy Engine and Progress Parser poll in-loop. A background task
//! polls the row; in-loop checks only ever read a local atomic, so they
//! never block on network I/O mid-copy or mid-stderr-line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use vidcompile_core::model::JobStatus;
use vidcompile_media::progress::CancelCheck;
use vidcompile_media::CopyHooks;
use vidcompile_store::JobStore;

pub struct CancellationWatcher {
    flag: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
}

impl CancellationWatcher {
    /// Spawns a poller that sets the shared flag once the job row reports
    /// `cancelled`, then exits. The poller also exits once `flag` is
    /// already true so it doesn't keep querying a finished job.
    pub fn spawn(store: Arc<JobStore>, job_id: Uuid, poll_interval: Duration) -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let flag_task = flag.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                if flag_task.load(Ordering::SeqCst) {
                    break;
                }
                match store.get_job(job_id).await {
                    Ok(job) if job.status == JobStatus::Cancelled => {
                        flag_task.store(true, Ordering::SeqCst);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(job_id = %job_id, error = %e, "cancellation poll failed, will retry");
                    }
                }
            }
        });
        Self { flag, handle }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn checker(&self) -> Arc<dyn CancelCheck> {
        Arc::new(FlagCancelCheck(self.flag.clone()))
    }

    pub fn copy_hooks(&self) -> Arc<dyn CopyHooks> {
        Arc::new(FlagCopyHooks(self.flag.clone()))
    }
}

impl Drop for CancellationWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct FlagCancelCheck(Arc<AtomicBool>);
impl CancelCheck for FlagCancelCheck {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct FlagCopyHooks(Arc<AtomicBool>);
impl CopyHooks for FlagCopyHooks {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool as StdAtomicBool;

    #[test]
    fn flag_copy_hooks_reflects_shared_atomic() {
        let flag = Arc::new(StdAtomicBool::new(false));
        let hooks = FlagCopyHooks(flag.clone());
        assert!(!hooks.is_cancelled());
        flag.store(true, Ordering::SeqCst);
        assert!(hooks.is_cancelled());
    }
}
