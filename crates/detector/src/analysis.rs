//! Detector output: events and per-frame analysis

use crate::state::{EyeState, UserStatus};
use feature_engine::FrameFeatures;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Event vocabulary of the telemetry log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    SessionStart,
    SessionEnd,
    Blink,
    MicroSleepDetected,
    YawnDetected,
    StareAlertTriggered,
    LowBpmAlertTriggered,
    FatigueScoreAlert,
    BreakTaken,
    UserIdleStart,
    UserActiveResume,
    SummaryEar,
    SummaryBpm,
}

impl EventType {
    pub const ALL: [EventType; 13] = [
        EventType::SessionStart,
        EventType::SessionEnd,
        EventType::Blink,
        EventType::MicroSleepDetected,
        EventType::YawnDetected,
        EventType::StareAlertTriggered,
        EventType::LowBpmAlertTriggered,
        EventType::FatigueScoreAlert,
        EventType::BreakTaken,
        EventType::UserIdleStart,
        EventType::UserActiveResume,
        EventType::SummaryEar,
        EventType::SummaryBpm,
    ];

    /// Event types that count toward a session's fatigue-event total
    pub const FATIGUE: [EventType; 3] = [
        EventType::MicroSleepDetected,
        EventType::YawnDetected,
        EventType::FatigueScoreAlert,
    ];

    /// Name stored in the event log
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SessionStart => "SESSION_START",
            EventType::SessionEnd => "SESSION_END",
            EventType::Blink => "BLINK",
            EventType::MicroSleepDetected => "MICRO_SLEEP_DETECTED",
            EventType::YawnDetected => "YAWN_DETECTED",
            EventType::StareAlertTriggered => "STARE_ALERT_TRIGGERED",
            EventType::LowBpmAlertTriggered => "LOW_BPM_ALERT_TRIGGERED",
            EventType::FatigueScoreAlert => "FATIGUE_SCORE_ALERT",
            EventType::BreakTaken => "20_20_20_BREAK_TAKEN",
            EventType::UserIdleStart => "USER_IDLE_START",
            EventType::UserActiveResume => "USER_ACTIVE_RESUME",
            EventType::SummaryEar => "SUMMARY_EAR",
            EventType::SummaryBpm => "SUMMARY_BPM",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown event type: {s}"))
    }
}

/// Discrete event produced by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DetectorEvent {
    /// Eyes crossed the closed threshold
    Blink,

    /// Long blink while the head was nodding
    MicroSleep { duration_ms: f64 },

    Yawn,

    /// No blink for too long
    StareAlert { seconds_since_blink: f64 },

    LowBlinkRate { bpm: f64 },

    FatigueAlert { score: u32 },

    /// A scheduled eye break started
    BreakTaken,

    /// Face absent long enough to pause
    UserIdle { active_secs: f64 },

    /// Face back after an idle period
    UserActive { idle_secs: f64 },
}

impl DetectorEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            DetectorEvent::Blink => EventType::Blink,
            DetectorEvent::MicroSleep { .. } => EventType::MicroSleepDetected,
            DetectorEvent::Yawn => EventType::YawnDetected,
            DetectorEvent::StareAlert { .. } => EventType::StareAlertTriggered,
            DetectorEvent::LowBlinkRate { .. } => EventType::LowBpmAlertTriggered,
            DetectorEvent::FatigueAlert { .. } => EventType::FatigueScoreAlert,
            DetectorEvent::BreakTaken => EventType::BreakTaken,
            DetectorEvent::UserIdle { .. } => EventType::UserIdleStart,
            DetectorEvent::UserActive { .. } => EventType::UserActiveResume,
        }
    }

    /// Numeric payload written alongside the event
    pub fn value(&self) -> Option<f64> {
        match *self {
            DetectorEvent::MicroSleep { duration_ms } => Some(duration_ms),
            DetectorEvent::StareAlert { seconds_since_blink } => Some(seconds_since_blink),
            DetectorEvent::LowBlinkRate { bpm } => Some(bpm),
            DetectorEvent::FatigueAlert { score } => Some(score as f64),
            DetectorEvent::UserIdle { active_secs } => Some(active_secs),
            DetectorEvent::UserActive { idle_secs } => Some(idle_secs),
            DetectorEvent::Blink | DetectorEvent::Yawn | DetectorEvent::BreakTaken => None,
        }
    }
}

/// Result of processing one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameAnalysis {
    /// Whether a face was present
    pub face_detected: bool,

    /// Frame swallowed by a running break
    pub on_break: bool,

    /// Features of this frame, if a face was present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<FrameFeatures>,

    pub gaze_centered: bool,

    pub head_tilted_down: bool,

    pub eye_state: EyeState,

    pub blink_rate_bpm: f64,

    pub fatigue_score: u32,

    pub status: UserStatus,

    /// Events raised by this frame, in detection order
    pub events: Vec<DetectorEvent>,
}

impl FrameAnalysis {
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn contains(&self, event_type: EventType) -> bool {
        self.events.iter().any(|e| e.event_type() == event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_round_trip() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>(), Ok(t));
        }
        assert!("NOT_AN_EVENT".parse::<EventType>().is_err());
    }

    #[test]
    fn test_event_payloads() {
        assert_eq!(DetectorEvent::Blink.value(), None);
        assert_eq!(DetectorEvent::FatigueAlert { score: 9 }.value(), Some(9.0));
        assert_eq!(
            DetectorEvent::BreakTaken.event_type().as_str(),
            "20_20_20_BREAK_TAKEN"
        );
    }
}
