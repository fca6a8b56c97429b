//! Library and track routes.
//!
//! - `GET /api/library`, `GET /api/library/songs`, `GET /api/library/search?q=`
//! - `GET /api/tracks/{id}`, `DELETE /api/tracks/{id}`
//! - `GET /api/artwork/{id}`

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{SearchQuery, SuccessResponse, TrackListResponse};
use crate::api::server::AppState;
use crate::library::Track;

/// Create the library router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tracks))
        .route("/songs", get(list_tracks))
        .route("/search", get(search_tracks))
}

/// Create the tracks router.
pub fn tracks_router() -> Router<AppState> {
    Router::new().route("/{id}", get(get_track).delete(delete_track))
}

/// Create the artwork router.
pub fn artwork_router() -> Router<AppState> {
    Router::new().route("/{id}", get(get_artwork))
}

pub(crate) fn track_not_found() -> ApiError {
    ApiError::not_found("Track not found")
}

async fn list_tracks(State(state): State<AppState>) -> Json<TrackListResponse> {
    Json(TrackListResponse {
        tracks: state.catalog.list_tracks(),
    })
}

async fn search_tracks(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<TrackListResponse>> {
    let q = query
        .q
        .filter(|q| !q.is_empty())
        .ok_or_else(ApiError::missing_query)?;
    Ok(Json(TrackListResponse {
        tracks: state.catalog.search(&q),
    }))
}

/// Artwork only lives inside the committed audio file, so a known track still
/// answers 404 with its own code.
async fn get_artwork(State(state): State<AppState>, Path(id): Path<String>) -> ApiError {
    if state.catalog.get_track(&id).is_none() {
        return track_not_found();
    }
    ApiError::new(
        StatusCode::NOT_FOUND,
        "NO_ARTWORK",
        "No standalone artwork available for this track",
    )
}

async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Track>> {
    let track = state.catalog.get_track(&id).ok_or_else(track_not_found)?;
    Ok(Json(track))
}

async fn delete_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    state
        .catalog
        .delete_track(&id)
        .await
        .ok_or_else(track_not_found)?;
    Ok(Json(SuccessResponse { success: true }))
}
