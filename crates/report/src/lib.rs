//! Wellness reporting
//!
//! Per-session reports compared against the user's recent history,
//! plus the dashboard aggregates (health score, fatigue hotspots,
//! activity clock, streak, weekly hours).

mod session;
mod summary;

pub use session::{
    build_session_report, historical_averages, session_report, GoalStatus, HistoricalAverages,
    MetricReport, MetricStatus, Performance, SessionMetrics, SessionReport, HISTORY_SESSIONS,
    MIN_SESSION_SECS,
};
pub use summary::{
    average_bpm, current_streak, dashboard_summary, fatigue_hotspot_hour, health_score,
    hour_histogram, weekly_activity, weekly_report, DashboardSummary, WeeklyReport,
    DEFAULT_AVG_BPM,
};

use thiserror::Error;

/// Report errors
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Session {0} not found")]
    SessionNotFound(i64),
    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),
}
