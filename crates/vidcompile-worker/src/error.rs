use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("job {0} not found")]
    JobNotFound(uuid::Uuid),
    #[error("job {0} has no items")]
    EmptyJob(uuid::Uuid),
    #[error("copy failed: {0}")]
    Copy(#[from] vidcompile_media::CopyError),
    #[error("probe failed for {path}: {source}")]
    Probe { path: String, #[source] source: vidcompile_media::ProbeError },
    #[error("progress parser error: {0}")]
    Progress(#[from] vidcompile_media::progress::ProgressError),
    #[error("transcoder exited with code {0}")]
    TranscoderFailed(i32),
    #[error("job was cancelled")]
    Cancelled,
    #[error("store error: {0}")]
    Store(#[from] vidcompile_store::StoreError),
    #[error("broker error: {0}")]
    Broker(#[from] vidcompile_broker::BrokerError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
