//! Error taxonomy for the store crate, shared by both the relational job
//! store and the warehouse gateway.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    JobNotFound(uuid::Uuid),
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("row was missing expected column: {0}")]
    MalformedRow(String),
}
