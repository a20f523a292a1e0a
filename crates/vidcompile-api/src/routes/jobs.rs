use std::path::Path as StdPath;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vidcompile_broker::Broker;
use vidcompile_core::model::{Job, JobItem, JobStatus};
use vidcompile_media::copy::{CopyEngine, HostKind};
use vidcompile_store::warehouse::VideoUpsertRow;
use vidcompile_store::JobPatch;

use crate::error::ApiError;
use crate::sanitize::sanitize_filename;
use crate::state::AppState;
use crate::verification::{PathCheckResult, VerificationRequest, VerificationResult};

fn host_kind(state: &AppState) -> HostKind {
    if state.config.paths.containerized {
        HostKind::Container
    } else {
        HostKind::DirectAccess
    }
}

#[derive(Debug, Deserialize)]
pub struct UserIdParam {
    pub user_id: Uuid,
}

pub async fn verify(
    State(state): State<AppState>,
    Query(_params): Query<UserIdParam>,
    Json(req): Json<VerificationRequest>,
) -> Result<Json<VerificationResult>, ApiError> {
    Ok(Json(state.verification.verify(&req).await?))
}

#[derive(Debug, Deserialize)]
pub struct VerifyPathRequest {
    pub path: String,
}

pub async fn verify_path(State(state): State<AppState>, Json(req): Json<VerifyPathRequest>) -> Json<PathCheckResult> {
    Json(state.verification.verify_path(&req.path).await)
}

#[derive(Debug, Deserialize)]
pub struct RevalidateRequest {
    pub items: Vec<JobItem>,
}

#[derive(Debug, Serialize)]
pub struct RevalidateResponse {
    pub total_duration: f64,
    pub items: Vec<JobItem>,
}

pub async fn revalidate(State(state): State<AppState>, Json(mut req): Json<RevalidateRequest>) -> Json<RevalidateResponse> {
    let total_duration = state.verification.revalidate(&mut req.items).await;
    Json(RevalidateResponse { total_duration, items: req.items })
}

#[derive(Debug, Deserialize)]
pub struct SubmitItemInput {
    pub item_type: vidcompile_core::model::ItemType,
    pub video_id: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    pub path: String,
    pub logo_path: Option<String>,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub is_4k: bool,
    pub text_animation_text: Option<String>,
    pub path_available: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub user_id: Uuid,
    pub channel_name: String,
    pub items: Vec<SubmitItemInput>,
    #[serde(default)]
    pub enable_4k: bool,
    #[serde(default)]
    pub enable_logos: bool,
    #[serde(default)]
    pub include_intro: bool,
    #[serde(default)]
    pub include_outro: bool,
    pub default_logo_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: String,
}

/// Admission: every item must already be flagged `path_available` by a
/// prior verify/revalidate call — submit never re-probes (§4.11 precondition).
pub async fn submit(State(state): State<AppState>, Json(req): Json<SubmitRequest>) -> Result<Json<SubmitResponse>, ApiError> {
    if req.items.is_empty() {
        return Err(ApiError::BadRequest("job must contain at least one item".to_string()));
    }
    if let Some((position, _)) = req.items.iter().enumerate().find(|(_, i)| !i.path_available) {
        return Err(ApiError::BadRequest(format!("item at position {} is not available", position + 1)));
    }

    let mut job = Job::new(req.user_id, req.channel_name.clone());
    job.enable_4k = req.enable_4k;
    job.enable_logos = req.enable_logos;
    job.include_intro = req.include_intro;
    job.include_outro = req.include_outro;
    job.default_logo_path = req.default_logo_path.clone();
    job.has_text_animation = req.items.iter().any(|i| i.text_animation_text.as_deref().is_some_and(|t| !t.is_empty()));

    let items: Vec<JobItem> = req
        .items
        .into_iter()
        .enumerate()
        .map(|(idx, input)| {
            let mut item = JobItem::new(job.id, (idx + 1) as u32, input.item_type, input.path);
            item.video_id = input.video_id;
            item.title = input.title;
            item.logo_path = input.logo_path;
            item.duration = input.duration;
            item.resolution = input.resolution;
            item.is_4k = input.is_4k;
            item.text_animation_text = input.text_animation_text;
            item.path_available = input.path_available;
            item
        })
        .collect();

    state.store.create_job(&job, &items).await?;
    state.dispatcher.dispatch(&job, &items).await?;

    Ok(Json(SubmitResponse { job_id: job.id, status: job.status.to_string() }))
}

pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.store.get_job(job_id).await?))
}

pub async fn get_items(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<Json<Vec<JobItem>>, ApiError> {
    Ok(Json(state.store.get_items(job_id).await?))
}

pub async fn cancel(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    let job = state.store.get_job(job_id).await?;
    if job.status.is_terminal() {
        return Err(ApiError::BadRequest(format!("job {job_id} is already in a terminal state")));
    }

    state.store.apply_patch(job_id, JobPatch::Cancel).await?;

    if let Some(task_id) = &job.task_id {
        if let Err(e) = state.broker.revoke(task_id, true).await {
            tracing::warn!(job_id = %job_id, error = %e, "broker revoke failed during cancel");
        }
    }

    let temp_dir = StdPath::new(&state.config.paths.temp_dir).join(job_id.to_string());
    let _ = tokio::fs::remove_dir_all(&temp_dir).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Publishes immediately-returning; the copy to the production share runs
/// in the background and the job row is updated on completion (§6).
pub async fn move_to_production(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    let job = state.store.get_job(job_id).await?;
    let output_path = job.output_path.clone().ok_or_else(|| ApiError::BadRequest("job has no output yet".to_string()))?;
    let production_root = state
        .warehouse
        .production_root(&job.channel_name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no production root configured for channel {}", job.channel_name)))?;

    let now = chrono::Utc::now();
    let dest_dir = format!("{production_root}/{}/{}", now.format("%Y"), now.format("%b").to_string().to_lowercase());
    let dest_filename = format!("{}.mp4", sanitize_filename(&output_path));
    let kind = host_kind(&state);
    let store = state.store.clone();

    tokio::spawn(async move {
        let engine = CopyEngine::with_default_parallelism(kind);
        match engine.copy_one(&output_path, &dest_dir, &dest_filename).await {
            Ok(published) => {
                let _ = store
                    .apply_patch(job_id, JobPatch::MoveToProduction { production_path: published.to_string_lossy().to_string() })
                    .await;
            }
            Err(e) => tracing::warn!(job_id = %job_id, error = %e, "move-to-production copy failed"),
        }
    });

    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct VideoUpsertInput {
    pub id: Uuid,
    pub path: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct VideoUpsertResultItem {
    pub id: Uuid,
    pub saved: bool,
    pub updated: bool,
    pub error: Option<String>,
}

pub async fn upsert_videos(State(state): State<AppState>, Json(req): Json<Vec<VideoUpsertInput>>) -> Json<Vec<VideoUpsertResultItem>> {
    let rows: Vec<VideoUpsertRow> = req.iter().map(|i| VideoUpsertRow { id: i.id, path: i.path.clone(), title: i.title.clone() }).collect();

    let out = match state.warehouse.upsert_videos(&rows).await {
        Ok(updated_flags) => req
            .iter()
            .zip(updated_flags)
            .map(|(input, updated)| VideoUpsertResultItem { id: input.id, saved: true, updated, error: None })
            .collect(),
        Err(e) => {
            let message = e.to_string();
            req.iter()
                .map(|input| VideoUpsertResultItem { id: input.id, saved: false, updated: false, error: Some(message.clone()) })
                .collect()
        }
    };

    Json(out)
}

#[derive(Debug, Serialize)]
pub struct UserJobStat {
    pub job_id: Uuid,
    pub position: usize,
    pub is_processing: bool,
    pub waiting_count: usize,
}

#[derive(Debug, Serialize)]
pub struct QueueStatsResponse {
    pub total_in_queue: usize,
    pub active_workers: usize,
    pub user_jobs: Vec<UserJobStat>,
    pub available_slots: usize,
}

pub async fn queue_stats(State(state): State<AppState>, Query(params): Query<UserIdParam>) -> Result<Json<QueueStatsResponse>, ApiError> {
    let jobs = state.store.list_non_terminal_ordered().await?;
    let total_in_queue = jobs.iter().filter(|j| j.status == JobStatus::Queued).count();
    let processing_count = jobs.iter().filter(|j| j.status == JobStatus::Processing).count();
    let max_concurrent = state.config.concurrency.max_concurrent_jobs;

    let mut user_jobs = Vec::new();
    let mut waiting_ahead = 0usize;
    for (idx, job) in jobs.iter().enumerate() {
        match job.status {
            JobStatus::Queued => {
                if job.user_id == params.user_id {
                    user_jobs.push(UserJobStat { job_id: job.id, position: idx + 1, is_processing: false, waiting_count: waiting_ahead });
                }
                waiting_ahead += 1;
            }
            JobStatus::Processing if job.user_id == params.user_id => {
                user_jobs.push(UserJobStat { job_id: job.id, position: idx + 1, is_processing: true, waiting_count: 0 });
            }
            _ => {}
        }
    }

    Ok(Json(QueueStatsResponse {
        total_in_queue,
        active_workers: processing_count,
        user_jobs,
        available_slots: max_concurrent.saturating_sub(processing_count),
    }))
}
