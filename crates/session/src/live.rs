//! Live statistics shared with the query surface

use crate::aggregator::SessionAggregator;
use detector::{FrameAnalysis, UserStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Point-in-time view of the running session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveStats {
    pub session_id: Option<i64>,
    pub monitoring: bool,
    pub blink_count: u64,
    /// Includes the in-progress active interval
    pub active_time_sec: f64,
    pub blink_rate_bpm: f64,
    pub yawn_count: u64,
    pub gaze_centered: bool,
    pub fatigue_score: u32,
}

#[derive(Debug, Default)]
struct LiveInner {
    session_id: Option<i64>,
    monitoring: bool,
    blink_count: u64,
    yawn_count: u64,
    blink_rate_bpm: f64,
    gaze_centered: bool,
    fatigue_score: u32,
    flushed_active: Duration,
    active_since: Option<Instant>,
}

/// Cloneable handle; the frame loop writes, readers take snapshots
#[derive(Debug, Clone, Default)]
pub struct LiveStatsHandle {
    inner: Arc<RwLock<LiveInner>>,
}

impl LiveStatsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a session that started at `now`
    pub async fn begin(&self, session_id: i64, now: Instant) {
        let mut inner = self.inner.write().await;
        *inner = LiveInner {
            session_id: Some(session_id),
            monitoring: true,
            active_since: Some(now),
            ..Default::default()
        };
    }

    pub async fn update(
        &self,
        analysis: &FrameAnalysis,
        aggregator: &SessionAggregator,
        last_status_change: Instant,
    ) {
        let mut inner = self.inner.write().await;
        inner.blink_count = aggregator.blinks();
        inner.yawn_count = aggregator.yawns();
        inner.blink_rate_bpm = analysis.blink_rate_bpm;
        inner.gaze_centered = analysis.gaze_centered;
        inner.fatigue_score = analysis.fatigue_score;
        inner.flushed_active = aggregator.flushed_active();
        inner.active_since = match analysis.status {
            UserStatus::Active => Some(last_status_change),
            UserStatus::Idle => None,
        };
    }

    /// Freeze the counters once the session is closed
    pub async fn end(&self, active_secs: f64) {
        let mut inner = self.inner.write().await;
        inner.monitoring = false;
        inner.flushed_active = Duration::from_secs_f64(active_secs.max(0.0));
        inner.active_since = None;
    }

    pub async fn snapshot(&self, now: Instant) -> LiveStats {
        let inner = self.inner.read().await;
        let running = inner
            .active_since
            .map_or(Duration::ZERO, |since| now.saturating_duration_since(since));

        LiveStats {
            session_id: inner.session_id,
            monitoring: inner.monitoring,
            blink_count: inner.blink_count,
            active_time_sec: (inner.flushed_active + running).as_secs_f64(),
            blink_rate_bpm: inner.blink_rate_bpm,
            yawn_count: inner.yawn_count,
            gaze_centered: inner.gaze_centered,
            fatigue_score: inner.fatigue_score,
        }
    }
}
