//! Axum HTTP/WebSocket surface for CutMirror.
//!
//! A thin layer over [`cutmirror_worker::JobService`]: submit a session,
//! poll or stream its progress, fetch the result, cancel it.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
