//! Session aggregator

use detector::{DetectorEvent, EventType, FrameAnalysis, UserStatus};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// One row destined for the event log
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogEntry {
    pub event_type: EventType,
    pub value: Option<f64>,
}

impl LogEntry {
    pub fn new(event_type: EventType, value: Option<f64>) -> Self {
        Self { event_type, value }
    }
}

impl From<&DetectorEvent> for LogEntry {
    fn from(event: &DetectorEvent) -> Self {
        Self::new(event.event_type(), event.value())
    }
}

/// Final session bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionTotals {
    pub active_secs: f64,
    pub idle_secs: f64,
    pub blinks: u64,
    pub yawns: u64,
}

/// Counters and time accounting for the open session
#[derive(Debug)]
pub struct SessionAggregator {
    summary_interval: Duration,
    last_summary: Option<Instant>,
    blinks: u64,
    yawns: u64,
    active: Duration,
    idle: Duration,
}

impl SessionAggregator {
    pub fn new(summary_interval: Duration) -> Self {
        Self {
            summary_interval,
            last_summary: None,
            blinks: 0,
            yawns: 0,
            active: Duration::ZERO,
            idle: Duration::ZERO,
        }
    }

    pub fn blinks(&self) -> u64 {
        self.blinks
    }

    pub fn yawns(&self) -> u64 {
        self.yawns
    }

    /// Active time flushed at status transitions so far
    pub fn flushed_active(&self) -> Duration {
        self.active
    }

    /// Fold one frame in; returns the rows to log, in order
    pub fn record(&mut self, analysis: &FrameAnalysis, now: Instant) -> Vec<LogEntry> {
        let mut rows: Vec<LogEntry> = Vec::with_capacity(analysis.events.len() + 2);

        for event in &analysis.events {
            match *event {
                DetectorEvent::Blink => self.blinks += 1,
                DetectorEvent::Yawn => self.yawns += 1,
                DetectorEvent::UserIdle { active_secs } => {
                    self.active += Duration::from_secs_f64(active_secs.max(0.0));
                }
                DetectorEvent::UserActive { idle_secs } => {
                    self.idle += Duration::from_secs_f64(idle_secs.max(0.0));
                }
                _ => {}
            }
            rows.push(event.into());
        }

        // Samples come from face frames that ran the full pipeline
        if let (Some(features), false) = (analysis.features, analysis.on_break) {
            let due = self
                .last_summary
                .map_or(true, |t| now.saturating_duration_since(t) > self.summary_interval);
            if due {
                rows.push(LogEntry::new(EventType::SummaryEar, Some(features.avg_ear)));
                rows.push(LogEntry::new(EventType::SummaryBpm, Some(analysis.blink_rate_bpm)));
                self.last_summary = Some(now);
            }
        }

        rows
    }

    /// Close the in-progress interval and return the totals
    pub fn finalize(
        &mut self,
        status: UserStatus,
        last_status_change: Instant,
        now: Instant,
    ) -> SessionTotals {
        let open = now.saturating_duration_since(last_status_change);
        match status {
            UserStatus::Active => self.active += open,
            UserStatus::Idle => self.idle += open,
        }

        SessionTotals {
            active_secs: self.active.as_secs_f64(),
            idle_secs: self.idle.as_secs_f64(),
            blinks: self.blinks,
            yawns: self.yawns,
        }
    }
}
