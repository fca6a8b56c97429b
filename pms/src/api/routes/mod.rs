//! API route modules.
//!
//! Organizes routes by resource type.

pub mod downloads;
pub mod health;
pub mod jobs;
pub mod library;
pub mod logging;
pub mod stream;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/api/jobs", jobs::list_router())
        .nest("/api/download", downloads::router())
        .nest("/api/health", health::router())
        .nest("/api/library", library::router())
        .nest("/api/tracks", library::tracks_router())
        .nest("/api/artwork", library::artwork_router())
        .nest("/api/stream", stream::router())
        .nest("/api/logging", logging::router())
        .with_state(state)
}
