use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use vidcompile_broker::BrokerError;
use vidcompile_store::StoreError;

/// Typed errors translated to HTTP responses per the API's error taxonomy
/// (§7): input errors -> 400, missing rows -> 404,
/// anything else -> 500.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Store(StoreError::JobNotFound(id)) => (StatusCode::NOT_FOUND, format!("job {id} not found")),
            ApiError::Store(StoreError::ChannelNotFound(name)) => (StatusCode::NOT_FOUND, format!("channel {name} not found")),
            ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::Broker(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
