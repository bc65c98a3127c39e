//! Statistics and Report Routes

use axum::{
    extract::{Path, State},
    Json,
};
use report::{DashboardSummary, SessionReport, WeeklyReport};
use session::LiveStats;

use crate::{ApiError, SharedState};

pub async fn live(State(state): State<SharedState>) -> Json<LiveStats> {
    let ctx = state.controller.context();
    Json(ctx.live.snapshot(ctx.clock.now()).await)
}

pub async fn summary(State(state): State<SharedState>) -> Result<Json<DashboardSummary>, ApiError> {
    let today = chrono::Local::now().date_naive();
    Ok(Json(report::dashboard_summary(state.repo(), today).await?))
}

pub async fn weekly(State(state): State<SharedState>) -> Result<Json<WeeklyReport>, ApiError> {
    let now = chrono::Local::now().naive_local();
    Ok(Json(report::weekly_report(state.repo(), now).await?))
}

pub async fn session(
    State(state): State<SharedState>,
    Path(session_id): Path<i64>,
) -> Result<Json<SessionReport>, ApiError> {
    Ok(Json(report::session_report(state.repo(), session_id).await?))
}
