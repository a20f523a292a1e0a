//! Filesystem- and subprocess-facing building blocks of the worker pipeline:
//! path normalization, parallel media probing, the fallback-chain copy
//! engine, GPU-availability detection, transcoder command construction, and
//! the transcoder progress parser.

pub mod copy;
pub mod gpu;
pub mod path;
pub mod probe;
pub mod progress;
pub mod transcoder;

pub use copy::{CopyEngine, CopyError, CopyHooks, CopyRequest};
pub use path::{PathTables, ShareEntry};
pub use probe::{ProbeError, ProbeInfo, ProbePool};
pub use progress::{ParsedProgressLine, ProgressOutcome, ProgressParser};
pub use transcoder::{build_transcoder_command, TranscoderOptions};
