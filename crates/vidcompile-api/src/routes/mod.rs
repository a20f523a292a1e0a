pub mod health;
pub mod jobs;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Assembles the full HTTP surface over a shared [`AppState`] (§6).
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/jobs/verify", post(jobs::verify))
        .route("/jobs/verify-path", post(jobs::verify_path))
        .route("/jobs/revalidate", post(jobs::revalidate))
        .route("/jobs/submit", post(jobs::submit))
        .route("/jobs/videos", post(jobs::upsert_videos))
        .route("/jobs/queue/stats", get(jobs::queue_stats))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/items", get(jobs::get_items))
        .route("/jobs/{id}/cancel", post(jobs::cancel))
        .route("/jobs/{id}/move-to-production", post(jobs::move_to_production))
        .with_state(state)
}
