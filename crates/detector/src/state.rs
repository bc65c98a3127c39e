//! Detector state carried from frame to frame

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

/// Blink phase of the eyes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EyeState {
    #[default]
    Open,
    Closing,
    Closed,
}

/// Whether a face is currently in front of the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UserStatus {
    #[default]
    Active,
    Idle,
}

/// Yawn timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YawnTimer {
    /// Mouth below the yawn threshold
    #[default]
    Idle,
    /// Mouth open wide since this instant
    Running(Instant),
    /// Yawn already counted, waiting for the mouth to close
    Counted,
}

/// Decaying drowsiness accumulator, never negative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FatigueScore(u32);

impl FatigueScore {
    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn add(&mut self, amount: u32) {
        self.0 = self.0.saturating_add(amount);
    }

    /// Remove `amount`, flooring at zero
    pub fn decay(&mut self, amount: u32) {
        self.0 = self.0.saturating_sub(amount);
    }
}

/// Everything the state machine remembers between frames
#[derive(Debug, Clone)]
pub struct DetectorState {
    /// Current blink phase
    pub eye_state: EyeState,

    /// When the eyes went fully closed
    pub eye_closed_since: Option<Instant>,

    /// EAR of the previous face frame, for velocity
    pub previous_ear: Option<f64>,

    /// Consecutive frames with gaze centered
    pub gaze_stable_frames: u32,

    /// Gaze centered on the last face frame
    pub gaze_centered: bool,

    /// Head pitched down on the last face frame
    pub head_tilted_down: bool,

    /// Last completed blink, or last moment the blink clock was reset
    pub last_blink: Instant,

    /// Blink instants inside the blink-rate window
    pub blink_times: VecDeque<Instant>,

    /// Blinks per minute over the window
    pub blink_rate_bpm: f64,

    pub yawn: YawnTimer,

    pub fatigue: FatigueScore,

    pub last_score_decay: Instant,

    pub last_fatigue_alert: Option<Instant>,

    pub last_stare_alert: Option<Instant>,

    pub last_low_bpm_alert: Option<Instant>,

    /// Active or idle
    pub status: UserStatus,

    /// Start of the current active/idle interval
    pub last_status_change: Instant,

    /// First frame of the current no-face streak
    pub no_face_since: Option<Instant>,

    /// End of the previous break (or session start)
    pub last_break: Instant,

    /// Set while a break is running
    pub break_started: Option<Instant>,
}

impl DetectorState {
    /// Fresh state for a session starting at `now`
    pub fn new(now: Instant) -> Self {
        Self {
            eye_state: EyeState::Open,
            eye_closed_since: None,
            previous_ear: None,
            gaze_stable_frames: 0,
            gaze_centered: false,
            head_tilted_down: false,
            last_blink: now,
            blink_times: VecDeque::with_capacity(128),
            blink_rate_bpm: 0.0,
            yawn: YawnTimer::Idle,
            fatigue: FatigueScore::default(),
            last_score_decay: now,
            last_fatigue_alert: None,
            last_stare_alert: None,
            last_low_bpm_alert: None,
            status: UserStatus::Active,
            last_status_change: now,
            no_face_since: None,
            last_break: now,
            break_started: None,
        }
    }

    pub fn on_break(&self) -> bool {
        self.break_started.is_some()
    }
}
