//! Monitoring Routes

use axum::{extract::State, Json};
use serde::Serialize;
use session::SessionError;

use crate::{ApiError, SharedState};

#[derive(Debug, Serialize)]
pub struct MonitoringResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
}

impl MonitoringResponse {
    fn status(status: &'static str) -> Json<Self> {
        Json(Self {
            status,
            session_id: None,
        })
    }
}

pub async fn start(State(state): State<SharedState>) -> Result<Json<MonitoringResponse>, ApiError> {
    match state.controller.start_monitoring().await {
        Ok(()) => Ok(MonitoringResponse::status("Monitoring started")),
        Err(SessionError::AlreadyActive) => Ok(MonitoringResponse::status("Monitoring is already active")),
        Err(e) => Err(e.into()),
    }
}

pub async fn stop(State(state): State<SharedState>) -> Result<Json<MonitoringResponse>, ApiError> {
    match state.controller.stop_monitoring().await {
        Ok(session_id) => Ok(Json(MonitoringResponse {
            status: "Monitoring stopped",
            session_id: Some(session_id),
        })),
        Err(SessionError::NotMonitoring) => Ok(MonitoringResponse::status("No active monitoring session")),
        Err(e) => Err(e.into()),
    }
}
