//! Prefetcher: owns the "already prefetched" set that guards the
//! fire-and-forget background copy of the next reserved job's inputs
//! (§4.11 step 0, §5's prefetch concurrency contract) — a component with
//! its own state, rather than a background task reaching into globals (§9).

use std::collections::HashSet;
use std::sync::Mutex;

use uuid::Uuid;

#[derive(Default)]
pub struct Prefetcher {
    claimed: Mutex<HashSet<Uuid>>,
}

impl Prefetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `job_id` is claimed for this process's
    /// lifetime; `false` on every subsequent call, making the prefetch
    /// fire-and-forget task idempotent per job.
    pub fn try_claim(&self, job_id: Uuid) -> bool {
        self.claimed.lock().expect("prefetch set mutex poisoned").insert(job_id)
    }

    pub fn is_claimed(&self, job_id: Uuid) -> bool {
        self.claimed.lock().expect("prefetch set mutex poisoned").contains(&job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_claim_succeeds_second_does_not() {
        let prefetcher = Prefetcher::new();
        let job_id = Uuid::new_v4();
        assert!(prefetcher.try_claim(job_id));
        assert!(!prefetcher.try_claim(job_id));
    }

    #[test]
    fn distinct_jobs_claim_independently() {
        let prefetcher = Prefetcher::new();
        assert!(prefetcher.try_claim(Uuid::new_v4()));
        assert!(prefetcher.try_claim(Uuid::new_v4()));
    }
}
