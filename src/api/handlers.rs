//! HTTP endpoint handlers

use std::{sync::Arc, time::Duration};

use axum::{extract::State, http::StatusCode, response::Json};
use tracing::{error, info, warn};

use super::responses::{ApiResponse, HealthResponse, StartRequest, StatusResponse};
use crate::{error::FocusError, state::AppState};

type HandlerResult = Result<Json<ApiResponse>, (StatusCode, Json<ApiResponse>)>;

/// Map a controller error onto an HTTP status and error body
fn reject(action: &str, err: FocusError) -> (StatusCode, Json<ApiResponse>) {
    let status = match &err {
        FocusError::Timer(_) | FocusError::ActiveTimerExists => {
            warn!("{} rejected: {}", action, err);
            StatusCode::CONFLICT
        }
        FocusError::Store(_) | FocusError::Poisoned(_) => {
            error!("{} failed: {}", action, err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ApiResponse::error(err.to_string())))
}

/// Handle POST /timer/start - Start a countdown or stopwatch
pub async fn start_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> HandlerResult {
    let activity_type = request.activity_type.trim();
    if activity_type.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("activity_type must not be empty".to_string())),
        ));
    }

    let duration = match request.duration_minutes {
        None => None,
        Some(minutes) => match Duration::try_from_secs_f64(minutes * 60.0) {
            Ok(d) if !d.is_zero() => Some(d),
            _ => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(format!(
                        "duration_minutes must be a positive number, got {}",
                        minutes
                    ))),
                ))
            }
        },
    };

    match state.start(activity_type, duration).await {
        Ok(timer) => {
            info!("Start endpoint called - {} started", activity_type);
            Ok(Json(ApiResponse::ok("Timer started".to_string(), timer)))
        }
        Err(e) => Err(reject("start", e)),
    }
}

/// Handle POST /timer/pause - Pause the running timer
pub async fn pause_handler(State(state): State<Arc<AppState>>) -> HandlerResult {
    match state.pause().await {
        Ok(timer) => Ok(Json(ApiResponse::ok("Timer paused".to_string(), timer))),
        Err(e) => Err(reject("pause", e)),
    }
}

/// Handle POST /timer/resume - Resume the paused timer
pub async fn resume_handler(State(state): State<Arc<AppState>>) -> HandlerResult {
    match state.resume().await {
        Ok(timer) => Ok(Json(ApiResponse::ok("Timer resumed".to_string(), timer))),
        Err(e) => Err(reject("resume", e)),
    }
}

/// Handle POST /timer/stop - Stop the timer and close its session
pub async fn stop_handler(State(state): State<Arc<AppState>>) -> HandlerResult {
    let elapsed = state.stop().await.map_err(|e| reject("stop", e))?;
    let timer = state.view().map_err(|e| reject("stop", e))?;
    Ok(Json(ApiResponse::ok(
        format!("Timer stopped at {}", crate::timer::format_hms(elapsed)),
        timer,
    )))
}

/// Handle GET /status - Return current timer and server status
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let timer = match state.view() {
        Ok(timer) => timer,
        Err(e) => {
            error!("Failed to get timer state: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let (last_action, last_action_time) = state.get_last_action();
    let settings = state.settings();

    Ok(Json(StatusResponse {
        timer,
        uptime: state.get_uptime(),
        port: settings.port,
        host: settings.host.clone(),
        last_action,
        last_action_time,
        errors: state.errors(),
    }))
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
