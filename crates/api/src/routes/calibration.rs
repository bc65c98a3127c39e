//! Calibration Routes

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use session::SessionError;
use tracing::error;

use crate::{ApiError, SharedState};

#[derive(Debug, Serialize)]
pub struct CalibrationStatus {
    pub is_calibrated: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CalibrationRequest {
    #[serde(default, alias = "userName")]
    pub user_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CalibrationResult {
    pub status: &'static str,
    pub message: &'static str,
}

pub async fn status(State(state): State<SharedState>) -> Json<CalibrationStatus> {
    Json(CalibrationStatus {
        is_calibrated: state.controller.context().profiles.is_calibrated().await,
    })
}

/// Blocks until the calibration run has consumed its frames
pub async fn calibrate(
    State(state): State<SharedState>,
    body: Option<Json<CalibrationRequest>>,
) -> Response {
    let user_name = body.and_then(|Json(req)| req.user_name);

    match state.controller.calibrate(user_name).await {
        Ok(_) => Json(CalibrationResult {
            status: "complete",
            message: "Calibration successful.",
        })
        .into_response(),
        Err(e @ SessionError::Conflict(_)) => ApiError::from(e).into_response(),
        Err(e) => {
            error!("Calibration failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CalibrationResult {
                    status: "failed",
                    message: "Calibration failed to save profile.",
                }),
            )
                .into_response()
        }
    }
}
