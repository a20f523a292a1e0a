//! GPU-encoder availability probe: attempts a 0.1s null encode once and
//! caches the result for the process lifetime.

use std::sync::OnceLock;
use std::time::Duration;

const ERROR_INDICATORS: &[&str] = &[
    "Cannot load libcuda",
    "Cannot load libnvidia-encode",
    "minimum required Nvidia driver",
    "No NVENC capable devices found",
];

static GPU_AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Checks whether a GPU-accelerated encoder is actually usable, not just
/// compiled into the transcoder binary. Cached after the first call.
pub fn is_gpu_available(transcoder_binary: &str) -> bool {
    *GPU_AVAILABLE.get_or_init(|| probe_gpu(transcoder_binary))
}

fn probe_gpu(transcoder_binary: &str) -> bool {
    let result = std::process::Command::new(transcoder_binary)
        .args([
            "-f", "lavfi", "-i", "nullsrc=s=256x256:d=0.1",
            "-c:v", "h264_nvenc", "-f", "null", "-",
        ])
        .output();

    match result {
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            !ERROR_INDICATORS.iter().any(|needle| stderr.contains(needle))
        }
        Err(_) => false,
    }
}

/// Timeout budget for the null-encode probe; exposed for callers that want
/// to run this inside `spawn_blocking` with a matching `tokio::time::timeout`.
pub const GPU_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_reports_unavailable() {
        assert!(!probe_gpu("/no/such/ffmpeg/binary"));
    }

    #[test]
    fn error_indicator_substrings_trigger_unavailable() {
        let stderr = "Cannot load libcuda: no such file";
        assert!(ERROR_INDICATORS.iter().any(|n| stderr.contains(n)));
    }
}
