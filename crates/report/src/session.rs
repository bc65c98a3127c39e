//! Session report

use crate::ReportError;
use detector::EventType;
use serde::{Deserialize, Serialize};
use storage::{EventCounts, Repository, Settings};
use tracing::{debug, warn};

/// Sessions with less active time are not reported or pooled
pub const MIN_SESSION_SECS: i64 = 30;

/// Completed sessions considered for the historical baseline
pub const HISTORY_SESSIONS: u32 = 20;

/// Tri-state verdict rendered by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStatus {
    Good,
    Warning,
    Neutral,
}

/// Headline numbers of one session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub active_secs: i64,
    pub blinks: u64,
    /// Blinks per active minute
    pub bpm: f64,
    pub stares: u64,
    /// Micro-sleeps, yawns and fatigue alerts combined
    pub fatigue_events: u64,
}

impl SessionMetrics {
    pub fn new(active_secs: i64, counts: &EventCounts) -> Self {
        let blinks = counts.get(EventType::Blink);
        let active_minutes = active_secs as f64 / 60.0;
        Self {
            active_secs,
            blinks,
            bpm: if active_minutes > 0.0 {
                blinks as f64 / active_minutes
            } else {
                0.0
            },
            stares: counts.get(EventType::StareAlertTriggered),
            fatigue_events: counts.fatigue_events(),
        }
    }

    pub fn is_reportable(&self) -> bool {
        self.active_secs >= MIN_SESSION_SECS
    }
}

/// Means over the recent reportable sessions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalAverages {
    pub session_count: usize,
    pub avg_bpm: f64,
    pub avg_stare_alerts: f64,
    pub avg_fatigue_events: f64,
}

/// Pool past sessions, skipping the ones too short to report
pub fn historical_averages(sessions: &[SessionMetrics]) -> Option<HistoricalAverages> {
    let pooled: Vec<&SessionMetrics> = sessions.iter().filter(|s| s.is_reportable()).collect();
    if pooled.is_empty() {
        return None;
    }

    let n = pooled.len() as f64;
    Some(HistoricalAverages {
        session_count: pooled.len(),
        avg_bpm: pooled.iter().map(|s| s.bpm).sum::<f64>() / n,
        avg_stare_alerts: pooled.iter().map(|s| s.stares as f64).sum::<f64>() / n,
        avg_fatigue_events: pooled.iter().map(|s| s.fatigue_events as f64).sum::<f64>() / n,
    })
}

/// One row of the performance table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    pub session: String,
    /// "N/A" without history
    pub historical: String,
    pub insight: String,
    pub status: MetricStatus,
}

impl MetricReport {
    fn neutral(session: String, insight: &str) -> Self {
        Self {
            session,
            historical: "N/A".to_string(),
            insight: insight.to_string(),
            status: MetricStatus::Neutral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub blink_rate: MetricReport,
    pub fatigue_events: MetricReport,
    pub stares: MetricReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalStatus {
    pub status: MetricStatus,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalAchievement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blink_rate: Option<GoalStatus>,
}

/// Structured report of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: i64,
    /// Set instead of the metrics when the session cannot be reported
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_time_str: Option<String>,
    pub goal_achievement: GoalAchievement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<Performance>,
}

fn blink_rate_report(current: &SessionMetrics, history: Option<&HistoricalAverages>) -> MetricReport {
    let mut report = MetricReport::neutral(
        format!("{:.1} BPM", current.bpm),
        "Complete more sessions for historical insights.",
    );
    let Some(h) = history else {
        return report;
    };

    report.historical = format!("{:.1} BPM", h.avg_bpm);
    if current.bpm > h.avg_bpm * 1.15 {
        report.insight =
            "Your blink rate was significantly higher than usual. Great job!".to_string();
        report.status = MetricStatus::Good;
    } else if current.bpm < h.avg_bpm * 0.85 {
        report.insight = "Your blink rate was significantly lower than usual. Remember to blink more often."
            .to_string();
        report.status = MetricStatus::Warning;
    }
    report
}

fn fatigue_report(current: &SessionMetrics, history: Option<&HistoricalAverages>) -> MetricReport {
    let mut report = MetricReport::neutral(current.fatigue_events.to_string(), "");
    let Some(h) = history else {
        return report;
    };

    let events = current.fatigue_events as f64;
    report.historical = format!("{:.1}", h.avg_fatigue_events);
    if h.avg_fatigue_events > 0.0 && events < h.avg_fatigue_events {
        report.insight =
            "You had fewer fatigue events than usual. Great job staying alert!".to_string();
        report.status = MetricStatus::Good;
    } else if events > h.avg_fatigue_events && current.fatigue_events > 1 {
        report.insight =
            "You had more fatigue events than usual. Consider taking more breaks.".to_string();
        report.status = MetricStatus::Warning;
    }
    report
}

fn stare_report(current: &SessionMetrics, history: Option<&HistoricalAverages>) -> MetricReport {
    let mut report = MetricReport::neutral(current.stares.to_string(), "");
    let Some(h) = history else {
        return report;
    };

    report.historical = format!("{:.1}", h.avg_stare_alerts);
    if current.stares as f64 > h.avg_stare_alerts && current.stares > 1 {
        report.insight =
            "You had more moments of intense focus. Remember the 20-20-20 rule.".to_string();
        report.status = MetricStatus::Warning;
    }
    report
}

fn goal_status(bpm: f64, settings: Option<&Settings>) -> Option<GoalStatus> {
    let settings = settings.filter(|s| s.enable_weekly_goals)?;
    let goal = settings.goal_blink_rate;
    if goal == 0 {
        return None;
    }

    Some(if bpm >= goal as f64 {
        GoalStatus {
            status: MetricStatus::Good,
            text: format!("ACHIEVED! (Your avg of {bpm:.1} BPM met the {goal} BPM target)"),
        }
    } else {
        GoalStatus {
            status: MetricStatus::Warning,
            text: format!("In Progress. (Your avg was {bpm:.1} BPM, goal is {goal} BPM)"),
        }
    })
}

/// Assemble the report from already-loaded data
pub fn build_session_report(
    session_id: i64,
    current: &SessionMetrics,
    history: Option<&HistoricalAverages>,
    settings: Option<&Settings>,
) -> SessionReport {
    if !current.is_reportable() {
        return SessionReport {
            session_id,
            error: Some("Session was too short to generate a meaningful wellness report.".to_string()),
            active_time_str: None,
            goal_achievement: GoalAchievement::default(),
            performance: None,
        };
    }

    let secs = current.active_secs;
    SessionReport {
        session_id,
        error: None,
        active_time_str: Some(format!("{} minutes, {} seconds", secs / 60, secs % 60)),
        goal_achievement: GoalAchievement {
            blink_rate: goal_status(current.bpm, settings),
        },
        performance: Some(Performance {
            blink_rate: blink_rate_report(current, history),
            fatigue_events: fatigue_report(current, history),
            stares: stare_report(current, history),
        }),
    }
}

/// Load a session with its history and settings, then build its report
pub async fn session_report(repo: &Repository, session_id: i64) -> Result<SessionReport, ReportError> {
    let session = repo
        .get_session(session_id)
        .await?
        .ok_or(ReportError::SessionNotFound(session_id))?;

    let counts = repo.event_counts(session_id).await?;
    let current = SessionMetrics::new(session.total_active_time_sec, &counts);

    let mut past = Vec::new();
    for s in repo.recent_completed_sessions(session_id, HISTORY_SESSIONS).await? {
        if s.total_active_time_sec < MIN_SESSION_SECS {
            continue;
        }
        let counts = repo.event_counts(s.session_id).await?;
        past.push(SessionMetrics::new(s.total_active_time_sec, &counts));
    }
    let history = historical_averages(&past);
    debug!(
        "Session {} compared against {} past sessions",
        session_id,
        history.map_or(0, |h| h.session_count)
    );

    let settings = repo.get_settings().await.unwrap_or_else(|e| {
        warn!("Could not read settings for goals: {}", e);
        None
    });

    Ok(build_session_report(
        session_id,
        &current,
        history.as_ref(),
        settings.as_ref(),
    ))
}
