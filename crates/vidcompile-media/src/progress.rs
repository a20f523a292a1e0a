//! Progress Parser (C11): line-oriented transcoder stderr parsing, percent
//! computation, sidecar persistence, and the cancel/prefetch poll hooks.
//!
//! Does not write a `processing` status tick; the job's status transition
//! happens once, before the transcoder is launched.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("failed to spawn transcoder process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("transcoder stderr pipe was not available")]
    NoStderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParsedProgressLine {
    pub current_s: Option<f64>,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
}

/// Parses one line of `ffmpeg -progress`-style stderr. Unrecognized lines
/// parse to all-`None` and are not an error; most stderr output isn't a
/// progress line at all.
pub fn parse_progress_line(line: &str) -> ParsedProgressLine {
    ParsedProgressLine {
        current_s: extract_after(line, "time=").and_then(parse_timestamp),
        fps: extract_after(line, "fps=").and_then(|s| s.trim().parse().ok()),
        speed: extract_after(line, "speed=").and_then(|s| s.trim_end_matches('x').trim().parse().ok()),
    }
}

fn extract_after<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let start = line.find(key)? + key.len();
    let rest = &line[start..];
    let end = rest.find(|c: char| c.is_whitespace()).unwrap_or(rest.len());
    Some(&rest[..end])
}

fn parse_timestamp(raw: &str) -> Option<f64> {
    let mut parts = raw.splitn(3, ':');
    let h: f64 = parts.next()?.parse().ok()?;
    let m: f64 = parts.next()?.parse().ok()?;
    let s: f64 = parts.next()?.parse().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}

/// `min(99, floor(100 * current / total))`. Never reports 100 from a
/// progress line; completion is signalled by process exit, not by percent.
pub fn compute_percent(current_s: f64, total_s: f64) -> u32 {
    if total_s <= 0.0 {
        return 0;
    }
    let pct = (100.0 * current_s / total_s).floor();
    pct.clamp(0.0, 99.0) as u32
}

pub trait CancelCheck: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

pub trait PrefetchHook: Send + Sync {
    fn on_prefetch_point(&self);
}

pub struct NoCancelCheck;
impl CancelCheck for NoCancelCheck {
    fn is_cancelled(&self) -> bool {
        false
    }
}

pub struct NoPrefetchHook;
impl PrefetchHook for NoPrefetchHook {
    fn on_prefetch_point(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressOutcome {
    pub exit_code: i32,
    pub cancelled: bool,
}

pub struct ProgressParser {
    pub sidecar_dir: String,
}

impl ProgressParser {
    pub fn new(sidecar_dir: impl Into<String>) -> Self {
        Self { sidecar_dir: sidecar_dir.into() }
    }

    /// Launches `binary` with `args`, streaming stderr line by line.
    /// `on_progress` is invoked only when the computed percent changes.
    /// Cancellation is polled every 5 percentage points; the prefetch hook
    /// fires every 20. A cancelled run sends SIGTERM, waits 5s, then
    /// SIGKILL.
    pub async fn run(
        &self,
        binary: &str,
        args: &[String],
        total_duration_s: f64,
        cancel: Arc<dyn CancelCheck>,
        prefetch: Arc<dyn PrefetchHook>,
        mut on_progress: impl FnMut(u32),
    ) -> Result<ProgressOutcome, ProgressError> {
        tokio::fs::create_dir_all(&self.sidecar_dir).await.ok();
        self.write_sidecar("ffmpeg_cmd.txt", &format!("{binary} {}", args.join(" "))).await;

        let mut child = Command::new(binary)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take().ok_or(ProgressError::NoStderr)?;
        let mut lines = BufReader::new(stderr).lines();

        let mut full_stderr = String::new();
        let mut last_percent: Option<u32> = None;
        let mut last_poll_bucket: i64 = -1;
        let mut last_prefetch_bucket: i64 = -1;
        let mut cancelled = false;

        while let Some(line) = lines.next_line().await? {
            full_stderr.push_str(&line);
            full_stderr.push('\n');

            let parsed = parse_progress_line(&line);
            if let Some(current_s) = parsed.current_s {
                let percent = compute_percent(current_s, total_duration_s);
                if Some(percent) != last_percent {
                    on_progress(percent);
                    last_percent = Some(percent);
                }

                let poll_bucket = (percent / 5) as i64;
                if poll_bucket != last_poll_bucket {
                    last_poll_bucket = poll_bucket;
                    if cancel.is_cancelled() {
                        cancelled = true;
                        terminate(&mut child).await;
                        break;
                    }
                }

                let prefetch_bucket = (percent / 20) as i64;
                if prefetch_bucket != last_prefetch_bucket {
                    last_prefetch_bucket = prefetch_bucket;
                    prefetch.on_prefetch_point();
                }
            }
        }

        self.write_sidecar("ffmpeg_stderr.txt", &full_stderr).await;

        let exit_code = if cancelled {
            -1
        } else {
            child.wait().await?.code().unwrap_or(-1)
        };

        Ok(ProgressOutcome { exit_code, cancelled })
    }

    async fn write_sidecar(&self, filename: &str, contents: &str) {
        let path = Path::new(&self.sidecar_dir).join(filename);
        if let Ok(mut f) = tokio::fs::File::create(&path).await {
            let _ = f.write_all(contents.as_bytes()).await;
        }
    }
}

#[cfg(unix)]
async fn terminate(child: &mut tokio::process::Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(_) => {}
        }
    }

    if tokio::time::timeout(std::time::Duration::from_secs(5), child.wait()).await.is_err() {
        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

#[cfg(not(unix))]
async fn terminate(child: &mut tokio::process::Child) {
    let _ = child.kill().await;
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_well_formed_progress_line() {
        let line = "frame=  120 fps=30.0 q=-1.0 size=    2048kB time=00:00:04.00 bitrate=4194.3kbits/s speed=1.2x";
        let parsed = parse_progress_line(line);
        assert_eq!(parsed.current_s, Some(4.0));
        assert_eq!(parsed.fps, Some(30.0));
        assert_eq!(parsed.speed, Some(1.2));
    }

    #[test]
    fn non_progress_line_parses_to_none() {
        let parsed = parse_progress_line("Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'in.mp4':");
        assert_eq!(parsed.current_s, None);
    }

    #[test]
    fn timestamp_with_hours_parses_correctly() {
        let parsed = parse_progress_line("time=01:02:03.50 fps=24.0");
        assert_eq!(parsed.current_s, Some(3723.5));
    }

    #[test]
    fn percent_never_reaches_100_from_a_progress_line() {
        assert_eq!(compute_percent(100.0, 100.0), 99);
        assert_eq!(compute_percent(99.9, 100.0), 99);
    }

    #[test]
    fn percent_floors_rather_than_rounds() {
        assert_eq!(compute_percent(49.9, 100.0), 49);
    }

    #[test]
    fn zero_duration_reports_zero_percent() {
        assert_eq!(compute_percent(5.0, 0.0), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_percent_is_bounded(current in 0.0f64..10_000.0, total in 1.0f64..10_000.0) {
            let pct = compute_percent(current, total);
            prop_assert!(pct <= 99);
        }

        #[test]
        fn prop_percent_monotonic_in_current(total in 1.0f64..1000.0, a in 0.0f64..1000.0, b in 0.0f64..1000.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(compute_percent(lo, total) <= compute_percent(hi, total));
        }
    }
}
