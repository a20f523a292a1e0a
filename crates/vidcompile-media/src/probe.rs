//! Probe Pool (C2): parallel external-process media probing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;

const MIN_TIMEOUT_SECS: u64 = 180;
const DEFAULT_PARALLELISM: usize = 8;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("path does not exist: {0}")]
    NotFound(String),
    #[error("failed to spawn probe process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("probe process timed out after {0:?}")]
    Timeout(Duration),
    #[error("probe output was not valid JSON: {0}")]
    MalformedOutput(String),
    #[error("probe output had no video stream")]
    NoVideoStream,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeInfo {
    pub duration_s: f64,
    pub width: u32,
    pub height: u32,
}

impl ProbeInfo {
    pub fn is_4k(&self) -> bool {
        self.width >= 3840 && self.height >= 2160
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

pub struct ProbePool {
    binary: String,
    parallelism: usize,
}

impl ProbePool {
    pub fn new(binary: impl Into<String>, parallelism: usize) -> Self {
        Self {
            binary: binary.into(),
            parallelism: parallelism.max(1),
        }
    }

    pub fn with_default_parallelism(binary: impl Into<String>) -> Self {
        Self::new(binary, DEFAULT_PARALLELISM)
    }

    /// Probes a single path: existence check (wakes stale network handles,
    /// fails fast for missing files), then an `ffprobe` invocation.
    pub async fn probe(&self, path: &str) -> Result<ProbeInfo, ProbeError> {
        let started = Instant::now();
        let metadata = tokio::fs::metadata(path).await;
        let elapsed = started.elapsed();
        if elapsed > Duration::from_secs(2) {
            tracing::warn!(path, elapsed_ms = elapsed.as_millis() as u64, "slow path existence check (possible stale network handle)");
        }
        let metadata = metadata.map_err(|_| ProbeError::NotFound(path.to_string()))?;

        let timeout = timeout_for_size(metadata.len());

        let output = tokio::time::timeout(
            timeout,
            Command::new(&self.binary)
                .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams", path])
                .output(),
        )
        .await
        .map_err(|_| ProbeError::Timeout(timeout))??;

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProbeError::MalformedOutput(e.to_string()))?;

        let video_stream = parsed
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .ok_or(ProbeError::NoVideoStream)?;

        let width = video_stream.width.ok_or(ProbeError::NoVideoStream)?;
        let height = video_stream.height.ok_or(ProbeError::NoVideoStream)?;
        let duration_s = parsed
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        Ok(ProbeInfo { duration_s, width, height })
    }

    /// Batch probe. Individual failures are recorded as `None`, never abort
    /// the batch. Results preserve the input key set, not completion order.
    pub async fn probe_many(&self, paths: &[String]) -> HashMap<String, Option<ProbeInfo>> {
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut handles = Vec::with_capacity(paths.len());

        for path in paths {
            let semaphore = semaphore.clone();
            let binary = self.binary.clone();
            let path = path.clone();
            let pool = ProbePool { binary, parallelism: 1 };
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let result = pool.probe(&path).await;
                if let Err(ref e) = result {
                    tracing::warn!(path = %path, error = %e, "probe failed");
                }
                (path, result.ok())
            }));
        }

        let mut results = HashMap::with_capacity(paths.len());
        for handle in handles {
            if let Ok((path, info)) = handle.await {
                results.insert(path, info);
            }
        }
        results
    }
}

fn timeout_for_size(size_bytes: u64) -> Duration {
    const BYTES_PER_SEC_BUDGET: u64 = 50 * 1024 * 1024;
    let proportional = size_bytes / BYTES_PER_SEC_BUDGET;
    Duration::from_secs(MIN_TIMEOUT_SECS.max(proportional))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_4k_boundary() {
        let info = ProbeInfo { duration_s: 1.0, width: 3840, height: 2160 };
        assert!(info.is_4k());
        let info = ProbeInfo { duration_s: 1.0, width: 3839, height: 2160 };
        assert!(!info.is_4k());
    }

    #[test]
    fn timeout_never_below_three_minutes() {
        assert_eq!(timeout_for_size(0), Duration::from_secs(180));
        assert_eq!(timeout_for_size(10), Duration::from_secs(180));
    }

    #[test]
    fn timeout_grows_with_size() {
        let big = timeout_for_size(200 * 1024 * 1024 * 1024);
        assert!(big > Duration::from_secs(180));
    }

    #[tokio::test]
    async fn probe_missing_file_is_not_found() {
        let pool = ProbePool::with_default_parallelism("ffprobe");
        let result = pool.probe("/no/such/file/here.mp4").await;
        assert!(matches!(result, Err(ProbeError::NotFound(_))));
    }

    #[tokio::test]
    async fn probe_many_isolates_per_path_failures() {
        let pool = ProbePool::with_default_parallelism("ffprobe");
        let paths = vec!["/no/such/a.mp4".to_string(), "/no/such/b.mp4".to_string()];
        let results = pool.probe_many(&paths).await;
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|v| v.is_none()));
    }
}
