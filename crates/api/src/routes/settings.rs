//! Settings Routes

use axum::{extract::State, Json};
use serde::Serialize;
use storage::Settings;
use tracing::info;

use crate::{ApiError, SharedState};

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub status: &'static str,
    pub message: &'static str,
}

pub async fn get_settings(State(state): State<SharedState>) -> Result<Json<Settings>, ApiError> {
    Ok(Json(state.repo().get_settings().await?.unwrap_or_default()))
}

pub async fn save_settings(
    State(state): State<SharedState>,
    Json(settings): Json<Settings>,
) -> Result<Json<SaveResponse>, ApiError> {
    state.repo().save_settings(&settings).await?;
    info!("Settings saved for {}", settings.user_name);
    Ok(Json(SaveResponse {
        status: "success",
        message: "Settings saved.",
    }))
}
