use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::info;

use crate::{calls::WorkerSid, config::SettingsSnapshot, error::AppError, server::AppState};

#[derive(Debug, Deserialize)]
pub struct PresenceUpdate {
    pub worker_sid: String,
    pub online: bool,
}

/// GET /api/settings - Current caller id and destination number
pub async fn get_settings(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok((StatusCode::OK, Json(state.settings.snapshot())))
}

/// POST /api/settings - Replace caller id and destination number
pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsSnapshot>,
) -> Result<impl IntoResponse, AppError> {
    let updated = state.settings.update(update);
    info!(
        caller_id = updated.caller_id.as_deref().unwrap_or("-"),
        destination = updated.destination_number.as_deref().unwrap_or("-"),
        "Forwarding settings updated"
    );
    Ok((StatusCode::OK, Json(updated)))
}

/// GET /api/agents - Task-routing workers with presence and contact address
pub async fn list_agents(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let agents = state.orchestrator.list_agents().await?;

    Ok((StatusCode::OK, Json(agents)))
}

/// POST /dashboard/status - Toggle a worker between Idle and Offline
pub async fn update_presence(
    State(state): State<AppState>,
    Json(update): Json<PresenceUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let worker = WorkerSid::new(update.worker_sid)?;
    state
        .orchestrator
        .update_worker_presence(&worker, update.online)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
