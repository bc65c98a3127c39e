//! Landmark Frame Route

use axum::{extract::State, http::StatusCode, Json};
use session::{ControllerMode, LandmarkFrame};

use crate::{ApiError, SharedState};

/// Queue one frame for the running session or calibration
///
/// Frames arriving while nothing is running are dropped with 204.
pub async fn push(
    State(state): State<SharedState>,
    Json(frame): Json<LandmarkFrame>,
) -> Result<StatusCode, ApiError> {
    if state.controller.mode().await == ControllerMode::Idle {
        return Ok(StatusCode::NO_CONTENT);
    }
    state.frames.push(frame)?;
    Ok(StatusCode::ACCEPTED)
}
