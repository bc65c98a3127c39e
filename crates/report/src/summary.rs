//! Dashboard aggregates

use crate::ReportError;
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use detector::EventType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use storage::{Repository, SessionRecord};

/// Blink rate assumed before any summary sample exists
pub const DEFAULT_AVG_BPM: f64 = 15.0;

/// Healthy blinks per minute, maps to a score of 100
const HEALTHY_BPM: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    /// 0..=100
    pub health_score: u32,
    pub avg_blink_rate: u32,
    /// Hour of day -> fatigue events
    pub fatigue_hotspots: BTreeMap<u32, u32>,
    /// Hour of day -> summary samples (a proxy for screen time)
    pub activity_clock: BTreeMap<u32, u32>,
    /// Consecutive days with a session
    pub current_streak: u32,
}

/// Active hours per day over the last week
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklyReport {
    /// Weekday abbreviations ("Mon", "Tue", ...)
    pub labels: Vec<String>,
    /// Hours, one decimal
    pub data: Vec<f64>,
}

/// Mean of the positive samples, or the default when there are none
pub fn average_bpm(samples: &[f64]) -> f64 {
    let positive: Vec<f64> = samples.iter().copied().filter(|v| *v > 0.0).collect();
    if positive.is_empty() {
        DEFAULT_AVG_BPM
    } else {
        positive.iter().sum::<f64>() / positive.len() as f64
    }
}

pub fn health_score(avg_bpm: f64) -> u32 {
    let raw = (avg_bpm / HEALTHY_BPM * 100.0).max(0.0);
    (raw as u32).min(100)
}

pub fn hour_histogram(timestamps: &[NaiveDateTime]) -> BTreeMap<u32, u32> {
    let mut hist = BTreeMap::new();
    for ts in timestamps {
        *hist.entry(ts.hour()).or_insert(0) += 1;
    }
    hist
}

/// Hour with the most fatigue events; ties go to the earliest hour
pub fn fatigue_hotspot_hour(hotspots: &BTreeMap<u32, u32>) -> Option<u32> {
    hotspots
        .iter()
        .fold(None, |best: Option<(u32, u32)>, (&hour, &count)| match best {
            Some((_, c)) if c >= count => best,
            _ => Some((hour, count)),
        })
        .map(|(hour, _)| hour)
}

/// Streak of consecutive session days
///
/// `days` must be distinct and newest first. The streak only counts
/// if the newest day is today or yesterday.
pub fn current_streak(days: &[NaiveDate], today: NaiveDate) -> u32 {
    let Some(&newest) = days.first() else {
        return 0;
    };
    if newest != today && Some(newest) != today.pred_opt() {
        return 0;
    }

    let mut streak = 1;
    for pair in days.windows(2) {
        if pair[0].signed_duration_since(pair[1]) == Duration::days(1) {
            streak += 1;
        } else {
            break;
        }
    }
    streak
}

/// Group sessions by start day, oldest first
pub fn weekly_activity(sessions: &[SessionRecord]) -> WeeklyReport {
    let mut by_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for s in sessions {
        *by_day.entry(s.start_time.date()).or_insert(0) += s.total_active_time_sec;
    }

    let mut report = WeeklyReport::default();
    for (day, secs) in by_day {
        report.labels.push(day.format("%a").to_string());
        report.data.push((secs as f64 / 3600.0 * 10.0).round() / 10.0);
    }
    report
}

/// Dashboard numbers over the whole event log
pub async fn dashboard_summary(repo: &Repository, today: NaiveDate) -> Result<DashboardSummary, ReportError> {
    let avg = average_bpm(&repo.event_values(EventType::SummaryBpm).await?);
    let fatigue = repo.event_timestamps(&EventType::FATIGUE).await?;
    let activity = repo.event_timestamps(&[EventType::SummaryEar]).await?;
    let days = repo.session_days().await?;

    Ok(DashboardSummary {
        health_score: health_score(avg),
        avg_blink_rate: avg as u32,
        fatigue_hotspots: hour_histogram(&fatigue),
        activity_clock: hour_histogram(&activity),
        current_streak: current_streak(&days, today),
    })
}

/// Active hours per day for sessions started in the last seven days
pub async fn weekly_report(repo: &Repository, now: NaiveDateTime) -> Result<WeeklyReport, ReportError> {
    let sessions = repo.sessions_since(now - Duration::days(7)).await?;
    Ok(weekly_activity(&sessions))
}
