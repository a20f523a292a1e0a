pub mod cancellation;
pub mod error;
pub mod keep_alive;
pub mod pipeline;
pub mod prefetch;

pub use cancellation::CancellationWatcher;
pub use error::WorkerError;
pub use keep_alive::KeepAlive;
pub use pipeline::{PipelineConfig, WorkerPipeline};
pub use prefetch::Prefetcher;
