//! Job Store Adapter (C5): typed operations over the `jobs`, `job_items`,
//! `profiles`, and `compilation_history` tables.
//!
//! Every field-level mutation a caller other than `submit` may make goes
//! through [`JobPatch`] — a sealed enum enumerating the legal updates, so a
//! Dispatcher, Worker, or Stale-Job Detector can never write a field outside
//! its mandate (replacing duck-typed job dict mutation with a sealed enum, §9).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use vidcompile_core::model::{ItemType, Job, JobItem, JobStatus, UserProfile};

use crate::error::StoreError;

/// The legal field-level updates to a job row. The Job Store Adapter accepts
/// only these; there is no generic "set arbitrary column" entry point.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPatch {
    /// Written by the Dispatcher after a confirmed broker submission, and
    /// overwritten by the Stale-Job Detector on re-dispatch.
    SetTaskId(String),
    /// Written once by the Worker Pipeline's step 2.
    StartProcessing { worker_id: String, queue_name: String },
    /// Written by the Progress Parser / Worker Pipeline on each percent tick.
    SetProgress { progress: u8, message: String },
    Complete { output_path: String, final_duration: f64 },
    Fail { error_message: String },
    /// Written by the API's cancel endpoint.
    Cancel,
    MoveToProduction { production_path: String },
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

fn datetime_to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Processing => "processing",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(s: &str) -> Result<JobStatus, StoreError> {
    Ok(match s {
        "queued" => JobStatus::Queued,
        "processing" => JobStatus::Processing,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "cancelled" => JobStatus::Cancelled,
        other => return Err(StoreError::MalformedRow(format!("unknown job status {other}"))),
    })
}

fn item_type_to_str(t: ItemType) -> &'static str {
    match t {
        ItemType::Intro => "intro",
        ItemType::Video => "video",
        ItemType::Transition => "transition",
        ItemType::Outro => "outro",
        ItemType::Image => "image",
    }
}

fn item_type_from_str(s: &str) -> Result<ItemType, StoreError> {
    Ok(match s {
        "intro" => ItemType::Intro,
        "video" => ItemType::Video,
        "transition" => ItemType::Transition,
        "outro" => ItemType::Outro,
        "image" => ItemType::Image,
        other => return Err(StoreError::MalformedRow(format!("unknown item type {other}"))),
    })
}

fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job, StoreError> {
    let status: String = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let started_at: Option<DateTime<Utc>> = row.try_get("started_at")?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at")?;
    let production_moved_at: Option<DateTime<Utc>> = row.try_get("production_moved_at")?;

    Ok(Job {
        id: row.try_get("job_id")?,
        user_id: row.try_get("user_id")?,
        channel_name: row.try_get("channel_name")?,
        status: status_from_str(&status)?,
        progress: row.try_get::<i32, _>("progress")? as u8,
        progress_message: row.try_get("progress_message")?,
        enable_4k: row.try_get("enable_4k")?,
        enable_logos: row.try_get("enable_logos")?,
        include_intro: row.try_get("include_intro")?,
        include_outro: row.try_get("include_outro")?,
        has_text_animation: row.try_get("has_text_animation")?,
        default_logo_path: row.try_get("default_logo_path")?,
        output_path: row.try_get("output_path")?,
        production_path: row.try_get("production_path")?,
        moved_to_production: row.try_get("moved_to_production")?,
        production_moved_at: production_moved_at.map(datetime_to_millis),
        final_duration: row.try_get("final_duration")?,
        error_message: row.try_get("error_message")?,
        worker_id: row.try_get("worker_id")?,
        queue_name: row.try_get("queue_name")?,
        task_id: row.try_get("task_id")?,
        created_at: datetime_to_millis(created_at),
        started_at: started_at.map(datetime_to_millis),
        completed_at: completed_at.map(datetime_to_millis),
    })
}

fn row_to_item(row: &sqlx::postgres::PgRow) -> Result<JobItem, StoreError> {
    let item_type: String = row.try_get("item_type")?;
    Ok(JobItem {
        job_id: row.try_get("job_id")?,
        position: row.try_get::<i32, _>("position")? as u32,
        item_type: item_type_from_str(&item_type)?,
        video_id: row.try_get("video_id")?,
        title: row.try_get("title")?,
        path: row.try_get("path")?,
        logo_path: row.try_get("logo_path")?,
        duration: row.try_get("duration")?,
        resolution: row.try_get("resolution")?,
        is_4k: row.try_get("is_4k")?,
        text_animation_text: row.try_get("text_animation_text")?,
        path_available: true,
        error: None,
    })
}

pub struct JobStore {
    pool: PgPool,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Persists a job and its (already-verified, contiguously-positioned)
    /// items in one transaction. JobItems are immutable after this call.
    pub async fn create_job(&self, job: &Job, items: &[JobItem]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO jobs (job_id, user_id, channel_name, status, progress, progress_message, \
             enable_4k, enable_logos, include_intro, include_outro, has_text_animation, \
             default_logo_path, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(job.id)
        .bind(job.user_id)
        .bind(&job.channel_name)
        .bind(status_to_str(job.status))
        .bind(job.progress as i32)
        .bind(&job.progress_message)
        .bind(job.enable_4k)
        .bind(job.enable_logos)
        .bind(job.include_intro)
        .bind(job.include_outro)
        .bind(job.has_text_animation)
        .bind(&job.default_logo_path)
        .bind(millis_to_datetime(job.created_at))
        .execute(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                "INSERT INTO job_items (job_id, position, item_type, video_id, title, path, \
                 logo_path, duration, resolution, is_4k, text_animation_text) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(item.job_id)
            .bind(item.position as i32)
            .bind(item_type_to_str(item.item_type))
            .bind(item.video_id)
            .bind(&item.title)
            .bind(&item.path)
            .bind(&item.logo_path)
            .bind(item.duration)
            .bind(&item.resolution)
            .bind(item.is_4k)
            .bind(&item.text_animation_text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Job, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE job_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::JobNotFound(id))?;
        row_to_job(&row)
    }

    pub async fn get_items(&self, job_id: Uuid) -> Result<Vec<JobItem>, StoreError> {
        let rows = sqlx::query("SELECT * FROM job_items WHERE job_id = $1 ORDER BY position ASC")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_item).collect()
    }

    pub async fn get_profile(&self, id: Uuid) -> Result<UserProfile, StoreError> {
        let row = sqlx::query("SELECT id, username, display_name FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::MalformedRow(format!("no profile for user {id}")))?;
        Ok(UserProfile {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
        })
    }

    /// Applies exactly one of the sealed [`JobPatch`] variants to a job row.
    pub async fn apply_patch(&self, id: Uuid, patch: JobPatch) -> Result<(), StoreError> {
        let now = Utc::now();
        match patch {
            JobPatch::SetTaskId(task_id) => {
                sqlx::query("UPDATE jobs SET task_id = $1 WHERE job_id = $2")
                    .bind(task_id)
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
            JobPatch::StartProcessing { worker_id, queue_name } => {
                sqlx::query(
                    "UPDATE jobs SET status = 'processing', worker_id = $1, queue_name = $2, \
                     started_at = $3, progress_message = 'Starting...' WHERE job_id = $4",
                )
                .bind(worker_id)
                .bind(queue_name)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
            JobPatch::SetProgress { progress, message } => {
                sqlx::query("UPDATE jobs SET progress = $1, progress_message = $2 WHERE job_id = $3")
                    .bind(progress.min(99) as i32)
                    .bind(message)
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
            JobPatch::Complete { output_path, final_duration } => {
                sqlx::query(
                    "UPDATE jobs SET status = 'completed', progress = 100, output_path = $1, \
                     final_duration = $2, progress_message = 'Completed', completed_at = $3 \
                     WHERE job_id = $4",
                )
                .bind(output_path)
                .bind(final_duration)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
            JobPatch::Fail { error_message } => {
                sqlx::query(
                    "UPDATE jobs SET status = 'failed', error_message = $1, completed_at = $2 \
                     WHERE job_id = $3 AND status != 'cancelled'",
                )
                .bind(error_message)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
            JobPatch::Cancel => {
                sqlx::query(
                    "UPDATE jobs SET status = 'cancelled', completed_at = $1 WHERE job_id = $2 \
                     AND status NOT IN ('completed', 'failed', 'cancelled')",
                )
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
            JobPatch::MoveToProduction { production_path } => {
                sqlx::query(
                    "UPDATE jobs SET production_path = $1, moved_to_production = true, \
                     production_moved_at = $2 WHERE job_id = $3",
                )
                .bind(production_path)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    /// Jobs eligible for the Stale-Job Detector's re-dispatch scan: queued,
    /// unassigned, older than `age_secs`.
    pub async fn list_stale_candidates(&self, age_secs: i64) -> Result<Vec<Job>, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(age_secs);
        let rows = sqlx::query(
            "SELECT * FROM jobs WHERE status = 'queued' AND worker_id IS NULL AND created_at < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_job).collect()
    }

    /// All non-terminal jobs ordered by `created_at`, for the queue-stats
    /// endpoint's position computation.
    pub async fn list_non_terminal_ordered(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM jobs WHERE status IN ('queued', 'processing') ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_job).collect()
    }

    /// Best-effort analytics write; callers treat failures as non-fatal.
    pub async fn record_compilation_history(
        &self,
        job_id: Uuid,
        user_id: Uuid,
        channel_name: &str,
        video_count: i32,
        total_duration: f64,
        output_filename: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO compilation_history (job_id, user_id, channel_name, video_count, \
             total_duration, output_filename) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(job_id)
        .bind(user_id)
        .bind(channel_name)
        .bind(video_count)
        .bind(total_duration)
        .bind(output_filename)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for s in [JobStatus::Queued, JobStatus::Processing, JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert_eq!(status_from_str(status_to_str(s)).unwrap(), s);
        }
    }

    #[test]
    fn item_type_round_trips_through_str() {
        for t in [ItemType::Intro, ItemType::Video, ItemType::Transition, ItemType::Outro, ItemType::Image] {
            assert_eq!(item_type_from_str(item_type_to_str(t)).unwrap(), t);
        }
    }

    #[test]
    fn unknown_status_string_is_malformed_row() {
        assert!(status_from_str("bogus").is_err());
    }

    #[test]
    fn millis_datetime_round_trip_is_lossless_at_ms_precision() {
        let millis = 1_700_000_000_123i64;
        let dt = millis_to_datetime(millis);
        assert_eq!(datetime_to_millis(dt), millis);
    }
}
