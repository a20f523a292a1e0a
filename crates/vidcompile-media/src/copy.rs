//! Copy Engine (C3): method-selecting file copier with an ordered fallback
//! chain, plus a parallel batch copier with progress and cancellation hooks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;

const DEFAULT_PARALLELISM: usize = 5;

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("source file not found: {0}")]
    SourceNotFound(String),
    #[error("all copy methods failed for {src}: {last_error}")]
    AllMethodsFailed { src: String, last_error: String },
    #[error("copy was cancelled")]
    Cancelled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// True on a host where shares are bind-mounted into an isolated-network
/// container (no UNC/SMB reachability); false on a direct-access host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    Container,
    DirectAccess,
}

#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub source_path: String,
    pub dest_filename: String,
}

/// Hooks consulted by `copy_many` after every completed file.
pub trait CopyHooks: Send + Sync {
    fn on_progress(&self, _completed: usize, _total: usize) {}
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A no-op hook set for callers that don't need progress or cancellation.
pub struct NoHooks;
impl CopyHooks for NoHooks {}

pub struct CopyEngine {
    host_kind: HostKind,
    parallelism: usize,
}

impl CopyEngine {
    pub fn new(host_kind: HostKind, parallelism: usize) -> Self {
        Self { host_kind, parallelism: parallelism.max(1) }
    }

    pub fn with_default_parallelism(host_kind: HostKind) -> Self {
        Self::new(host_kind, DEFAULT_PARALLELISM)
    }

    /// Copies one file, trying each method in the host's fallback chain in
    /// order and stopping at the first success. Idempotent: if the
    /// destination already exists with the source's size, the copy is
    /// skipped.
    pub async fn copy_one(&self, source_path: &str, dst_dir: &str, dst_name: &str) -> Result<PathBuf, CopyError> {
        let src_meta = tokio::fs::metadata(source_path)
            .await
            .map_err(|_| CopyError::SourceNotFound(source_path.to_string()))?;

        tokio::fs::create_dir_all(dst_dir).await?;
        let dst_path = Path::new(dst_dir).join(dst_name);

        if let Ok(existing) = tokio::fs::metadata(&dst_path).await {
            if existing.len() == src_meta.len() {
                return Ok(dst_path);
            }
        }

        let mut last_error = String::new();
        for method in self.fallback_chain() {
            match method.run(source_path, dst_dir, dst_name, src_meta.len()).await {
                Ok(()) => {
                    ensure_named_correctly(dst_dir, dst_name, source_path).await?;
                    return Ok(dst_path);
                }
                Err(e) => last_error = e,
            }
        }

        Err(CopyError::AllMethodsFailed { src: source_path.to_string(), last_error })
    }

    fn fallback_chain(&self) -> Vec<CopyMethod> {
        match self.host_kind {
            HostKind::Container => vec![CopyMethod::EfficientNetworkCopy, CopyMethod::GenericRetryCopy, CopyMethod::StreamCopy],
            HostKind::DirectAccess => vec![CopyMethod::RobocopyStyle, CopyMethod::StreamCopy],
        }
    }

    /// Copies many files with bounded parallelism. Hooks fire after each
    /// completed file; cancellation aborts remaining in-flight copies.
    pub async fn copy_many(
        &self,
        requests: &[CopyRequest],
        dst_dir: &str,
        hooks: Arc<dyn CopyHooks>,
    ) -> HashMap<String, Result<PathBuf, CopyError>> {
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let total = requests.len();
        let mut handles = Vec::with_capacity(total);

        for req in requests {
            let semaphore = semaphore.clone();
            let engine = CopyEngine::new(self.host_kind, 1);
            let dst_dir = dst_dir.to_string();
            let req = req.clone();
            let hooks = hooks.clone();
            handles.push(tokio::spawn(async move {
                if hooks.is_cancelled() {
                    return (req.dest_filename, Err(CopyError::Cancelled));
                }
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let result = engine.copy_one(&req.source_path, &dst_dir, &req.dest_filename).await;
                (req.dest_filename, result)
            }));
        }

        let mut results = HashMap::with_capacity(total);
        let mut completed = 0usize;
        for i in 0..handles.len() {
            if hooks.is_cancelled() {
                for remaining in &handles[i..] {
                    remaining.abort();
                }
                break;
            }
            if let Ok((name, result)) = (&mut handles[i]).await {
                completed += 1;
                hooks.on_progress(completed, total);
                results.insert(name, result);
            }
        }

        results
    }
}

#[derive(Debug, Clone, Copy)]
enum CopyMethod {
    EfficientNetworkCopy,
    GenericRetryCopy,
    StreamCopy,
    RobocopyStyle,
}

impl CopyMethod {
    async fn run(self, source_path: &str, dst_dir: &str, dst_name: &str, size_bytes: u64) -> Result<(), String> {
        match self {
            CopyMethod::EfficientNetworkCopy => {
                let timeout = dynamic_io_timeout(size_bytes);
                run_command_copy("rsync", &["-a", source_path, &Path::new(dst_dir).join(dst_name).to_string_lossy()], timeout).await
            }
            CopyMethod::GenericRetryCopy => {
                let mut last = String::new();
                for _ in 0..3 {
                    match run_command_copy("cp", &[source_path, &Path::new(dst_dir).join(dst_name).to_string_lossy()], Duration::from_secs(360)).await {
                        Ok(()) => return Ok(()),
                        Err(e) => {
                            last = e;
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
                Err(last)
            }
            CopyMethod::RobocopyStyle => {
                let mut last = String::new();
                for _ in 0..3 {
                    match run_command_copy(
                        "robocopy",
                        &[
                            &Path::new(source_path).parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default(),
                            dst_dir,
                            &Path::new(source_path).file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
                            "/R:3", "/W:5",
                        ],
                        Duration::from_secs(360),
                    )
                    .await
                    {
                        Ok(()) => return Ok(()),
                        Err(e) => last = e,
                    }
                }
                Err(last)
            }
            CopyMethod::StreamCopy => {
                let dst_path = Path::new(dst_dir).join(dst_name);
                tokio::fs::copy(source_path, &dst_path).await.map(|_| ()).map_err(|e| e.to_string())
            }
        }
    }
}

async fn run_command_copy(binary: &str, args: &[&str], timeout: Duration) -> Result<(), String> {
    let owned_args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    let result = tokio::time::timeout(
        timeout,
        tokio::process::Command::new(binary).args(&owned_args).output(),
    )
    .await;

    match result {
        Ok(Ok(output)) if output.status.success() => Ok(()),
        Ok(Ok(output)) => Err(format!("{binary} exited with {:?}", output.status.code())),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("{binary} timed out after {timeout:?}")),
    }
}

/// `max(300s, min(3600s, size_gb * 120s))` per the container-host efficient
/// copier's dynamic I/O timeout.
fn dynamic_io_timeout(size_bytes: u64) -> Duration {
    let size_gb = size_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    let secs = (size_gb * 120.0).clamp(300.0, 3600.0);
    Duration::from_secs_f64(secs)
}

/// Some copiers name the destination by the source's basename rather than
/// the requested `dst_name`; detect and rename.
async fn ensure_named_correctly(dst_dir: &str, dst_name: &str, source_path: &str) -> Result<(), CopyError> {
    let expected = Path::new(dst_dir).join(dst_name);
    if tokio::fs::metadata(&expected).await.is_ok() {
        return Ok(());
    }
    if let Some(basename) = Path::new(source_path).file_name() {
        let by_basename = Path::new(dst_dir).join(basename);
        if tokio::fs::metadata(&by_basename).await.is_ok() {
            tokio::fs::rename(&by_basename, &expected).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn dynamic_timeout_floor_is_300s() {
        assert_eq!(dynamic_io_timeout(500 * 1024 * 1024), Duration::from_secs(300));
    }

    #[test]
    fn dynamic_timeout_cap_is_3600s() {
        let fifty_gb = 50u64 * 1024 * 1024 * 1024;
        assert_eq!(dynamic_io_timeout(fifty_gb), Duration::from_secs(3600));
    }

    #[test]
    fn dynamic_timeout_scales_linearly_mid_range() {
        let ten_gb = 10u64 * 1024 * 1024 * 1024;
        let timeout = dynamic_io_timeout(ten_gb);
        assert_eq!(timeout, Duration::from_secs(1200));
    }

    #[tokio::test]
    async fn copy_one_stream_copies_small_file() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let src_path = src_dir.path().join("source.bin");
        let mut f = std::fs::File::create(&src_path).unwrap();
        f.write_all(b"hello world").unwrap();

        let engine = CopyEngine::with_default_parallelism(HostKind::Container);
        let result = engine
            .copy_one(src_path.to_str().unwrap(), dst_dir.path().to_str().unwrap(), "dest.bin")
            .await;
        assert!(result.is_ok());
        let contents = std::fs::read(dst_dir.path().join("dest.bin")).unwrap();
        assert_eq!(contents, b"hello world");
    }

    #[tokio::test]
    async fn copy_one_skips_when_dest_already_matches_size() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let src_path = src_dir.path().join("source.bin");
        std::fs::write(&src_path, b"same size").unwrap();
        std::fs::write(dst_dir.path().join("dest.bin"), b"same size").unwrap();

        let engine = CopyEngine::with_default_parallelism(HostKind::Container);
        let result = engine
            .copy_one(src_path.to_str().unwrap(), dst_dir.path().to_str().unwrap(), "dest.bin")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn copy_one_missing_source_is_not_found() {
        let dst_dir = tempfile::tempdir().unwrap();
        let engine = CopyEngine::with_default_parallelism(HostKind::DirectAccess);
        let result = engine.copy_one("/no/such/source.bin", dst_dir.path().to_str().unwrap(), "dest.bin").await;
        assert!(matches!(result, Err(CopyError::SourceNotFound(_))));
    }

    struct CountingHooks {
        cancelled: AtomicBool,
    }
    impl CopyHooks for CountingHooks {
        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn copy_many_is_order_independent_over_permutations() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let mut requests = Vec::new();
        for i in 0..4 {
            let path = src_dir.path().join(format!("f{i}.bin"));
            std::fs::write(&path, format!("contents-{i}")).unwrap();
            requests.push(CopyRequest { source_path: path.to_str().unwrap().to_string(), dest_filename: format!("out{i}.bin") });
        }

        let engine = CopyEngine::with_default_parallelism(HostKind::Container);
        let hooks = Arc::new(CountingHooks { cancelled: AtomicBool::new(false) });

        let forward = engine.copy_many(&requests, dst_dir.path().to_str().unwrap(), hooks.clone()).await;

        let mut reversed = requests.clone();
        reversed.reverse();
        let dst_dir2 = tempfile::tempdir().unwrap();
        let backward = engine.copy_many(&reversed, dst_dir2.path().to_str().unwrap(), hooks).await;

        assert_eq!(forward.len(), backward.len());
        for key in forward.keys() {
            assert!(forward[key].is_ok());
            assert!(backward[key].is_ok());
        }
    }
}
