//! Shared data model: [`Job`], [`JobItem`], and the catalog types they reference.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Intro,
    Video,
    Transition,
    Outro,
    Image,
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ItemType::Intro => "intro",
            ItemType::Video => "video",
            ItemType::Transition => "transition",
            ItemType::Outro => "outro",
            ItemType::Image => "image",
        };
        write!(f, "{s}")
    }
}

/// Queue lane selected by the dispatcher (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Queue {
    DefaultQueue,
    GpuQueue,
    FourKQueue,
}

impl Queue {
    pub fn as_str(self) -> &'static str {
        match self {
            Queue::DefaultQueue => "default_queue",
            Queue::GpuQueue => "gpu_queue",
            Queue::FourKQueue => "4k_queue",
        }
    }
}

impl std::fmt::Display for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn current_timestamp_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel_name: String,
    pub status: JobStatus,
    pub progress: u8,
    pub progress_message: String,
    pub enable_4k: bool,
    pub enable_logos: bool,
    pub include_intro: bool,
    pub include_outro: bool,
    pub has_text_animation: bool,
    pub default_logo_path: Option<String>,
    pub output_path: Option<String>,
    pub production_path: Option<String>,
    pub moved_to_production: bool,
    pub production_moved_at: Option<i64>,
    pub final_duration: Option<f64>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
    pub queue_name: Option<String>,
    pub task_id: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl Job {
    pub fn new(user_id: Uuid, channel_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            channel_name: channel_name.into(),
            status: JobStatus::Queued,
            progress: 0,
            progress_message: String::new(),
            enable_4k: false,
            enable_logos: false,
            include_intro: false,
            include_outro: false,
            has_text_animation: false,
            default_logo_path: None,
            output_path: None,
            production_path: None,
            moved_to_production: false,
            production_moved_at: None,
            final_duration: None,
            error_message: None,
            worker_id: None,
            queue_name: None,
            task_id: None,
            created_at: current_timestamp_ms(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn start_processing(&mut self, worker_id: impl Into<String>, queue: Queue) {
        self.status = JobStatus::Processing;
        self.worker_id = Some(worker_id.into());
        self.queue_name = Some(queue.to_string());
        self.started_at = Some(current_timestamp_ms());
        self.progress_message = "Starting...".to_string();
    }

    pub fn set_progress(&mut self, progress: u8, message: impl Into<String>) {
        self.progress = progress.min(99);
        self.progress_message = message.into();
    }

    pub fn complete(&mut self, output_path: impl Into<String>, final_duration: f64) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.output_path = Some(output_path.into());
        self.final_duration = Some(final_duration);
        self.progress_message = "Completed".to_string();
        self.completed_at = Some(current_timestamp_ms());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.status == JobStatus::Cancelled {
            return;
        }
        self.status = JobStatus::Failed;
        self.error_message = Some(reason.into());
        self.completed_at = Some(current_timestamp_ms());
    }

    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(current_timestamp_ms());
    }

    pub fn move_to_production(&mut self, production_path: impl Into<String>) {
        self.production_path = Some(production_path.into());
        self.moved_to_production = true;
        self.production_moved_at = Some(current_timestamp_ms());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobItem {
    pub job_id: Uuid,
    pub position: u32,
    pub item_type: ItemType,
    pub video_id: Option<Uuid>,
    pub title: String,
    pub path: String,
    pub logo_path: Option<String>,
    pub duration: f64,
    pub resolution: String,
    pub is_4k: bool,
    pub text_animation_text: Option<String>,
    /// Set by the verification service; absent items never reach admission.
    pub path_available: bool,
    pub error: Option<String>,
}

impl JobItem {
    pub fn new(job_id: Uuid, position: u32, item_type: ItemType, path: impl Into<String>) -> Self {
        Self {
            job_id,
            position,
            item_type,
            video_id: None,
            title: String::new(),
            path: path.into(),
            logo_path: None,
            duration: 0.0,
            resolution: String::new(),
            is_4k: false,
            text_animation_text: None,
            path_available: false,
            error: None,
        }
    }

    pub fn destination_filename(&self) -> String {
        let ext = std::path::Path::new(&self.path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        format!("{}_{}.{}", self.item_type, self.position, ext)
    }

    pub fn logo_filename(&self) -> Option<String> {
        self.logo_path.as_ref().map(|_| format!("logo_{}.png", self.position))
    }
}

/// Branding assets returned by the catalog for a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelAssets {
    pub intro_path: Option<String>,
    pub outro_path: Option<String>,
    pub logo_path: Option<String>,
    pub production_root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_lifecycle_transitions() {
        let mut job = Job::new(Uuid::new_v4(), "demo");
        assert_eq!(job.status, JobStatus::Queued);
        job.start_processing("worker-1", Queue::DefaultQueue);
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());
        job.complete("/out/file.mp4", 42.0);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn fail_does_not_override_cancelled() {
        let mut job = Job::new(Uuid::new_v4(), "demo");
        job.cancel();
        job.fail("late failure after cancel");
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[test]
    fn set_progress_clamps_below_100() {
        let mut job = Job::new(Uuid::new_v4(), "demo");
        job.set_progress(250, "overshoot");
        assert_eq!(job.progress, 99);
    }

    #[test]
    fn destination_filename_uses_type_and_position() {
        let item = JobItem::new(Uuid::new_v4(), 3, ItemType::Video, "/src/clip.mkv");
        assert_eq!(item.destination_filename(), "video_3.mkv");
    }
}
