//! Keep-Alive (C8): periodically touches each configured share mount root
//! to prevent stale network handles. Swallows all failures — the purpose
//! is to refresh handles, not to report on them (§4.7).

use std::time::Duration;

use tokio::sync::watch;

pub struct KeepAlive {
    mount_roots: Vec<String>,
    interval: Duration,
}

impl KeepAlive {
    pub fn new(mount_roots: Vec<String>, interval: Duration) -> Self {
        Self { mount_roots, interval }
    }

    /// Runs until `shutdown` reports `true`, concurrently listing every
    /// configured mount root on each tick.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.touch_all().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("keep-alive task shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn touch_all(&self) {
        let handles: Vec<_> = self
            .mount_roots
            .iter()
            .cloned()
            .map(|root| {
                tokio::spawn(async move {
                    if let Err(e) = tokio::fs::read_dir(&root).await {
                        tracing::debug!(root, error = %e, "keep-alive touch failed");
                    }
                })
            })
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn touch_all_swallows_missing_directories() {
        let keep_alive = KeepAlive::new(vec!["/no/such/mount".to_string()], Duration::from_secs(5));
        keep_alive.touch_all().await;
    }
}
