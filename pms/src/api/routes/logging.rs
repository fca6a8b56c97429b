//! Logging API routes.
//!
//! View and replace the active tracing filter at runtime.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::logging::{LoggingConfig, available_modules};

/// Request to update the log filter.
#[derive(Debug, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

/// Response for logging configuration.
#[derive(Debug, Serialize)]
pub struct LoggingConfigResponse {
    pub filter: String,
    pub available_modules: Vec<ModuleInfo>,
}

/// Information about an available logging module.
#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
}

/// Create the logging router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_logging_config).put(update_logging_config))
}

fn logging_config(state: &AppState) -> ApiResult<&LoggingConfig> {
    state
        .logging_config
        .as_deref()
        .ok_or_else(|| ApiError::internal("Logging configuration not available"))
}

fn config_response(config: &LoggingConfig) -> LoggingConfigResponse {
    LoggingConfigResponse {
        filter: config.get_filter(),
        available_modules: available_modules()
            .into_iter()
            .map(|(name, desc)| ModuleInfo {
                name: name.to_string(),
                description: desc.to_string(),
            })
            .collect(),
    }
}

async fn get_logging_config(
    State(state): State<AppState>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let config = logging_config(&state)?;
    Ok(Json(config_response(config)))
}

async fn update_logging_config(
    State(state): State<AppState>,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let config = logging_config(&state)?;
    config
        .set_filter(&request.filter)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(config_response(config)))
}
