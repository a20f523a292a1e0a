//! HTTP API for the video-compilation service: job submission, verification,
//! and queue introspection over the shared job store and broker (§6).

pub mod error;
pub mod routes;
pub mod sanitize;
pub mod state;
pub mod verification;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
