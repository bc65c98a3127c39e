//! Detector configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable thresholds for calibration and the per-frame state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Allowed gaze-ratio deviation from the calibrated center
    pub gaze_tolerance: f64,

    /// Nose drop (fraction of face height) that counts as head tilted down
    pub head_tilt_down_ratio: f64,

    /// Nose rise (fraction of face height) that counts as head tilted up
    pub head_tilt_up_ratio: f64,

    /// Consecutive centered frames required before blink/stare logic runs
    pub gaze_stability_frames: u32,

    /// Per-frame EAR drop that starts a blink
    pub ear_velocity_threshold: f64,

    /// Multiplier on the EAR threshold an eye must exceed to count as reopened
    pub reopen_hysteresis: f64,

    /// EAR threshold used without a valid calibration profile
    pub default_ear_threshold: f64,

    /// Closed duration above which a blink is a micro-sleep candidate (ms)
    pub micro_sleep_threshold_ms: u64,

    /// MAR above which the mouth counts as yawning
    pub yawn_mar_threshold: f64,

    /// Continuous elevated MAR required for a yawn (ms)
    pub yawn_duration_ms: u64,

    /// Seconds without a blink before a stare alert
    pub no_blink_threshold_secs: u64,

    /// Minimum seconds between stare alerts
    pub stare_alert_debounce_secs: u64,

    /// Sliding window for blink-rate computation (seconds)
    pub blink_rate_window_secs: u64,

    /// Blink rate (per minute) below which a low-rate alert fires
    pub low_blink_rate_bpm: f64,

    /// Minimum seconds between low blink-rate alerts
    pub low_blink_rate_debounce_secs: u64,

    /// Fatigue score added by a long blink with head nod
    pub score_increment_long_blink: u32,

    /// Fatigue score added by a yawn
    pub score_increment_yawn: u32,

    /// Fatigue score removed per decay tick
    pub score_decay_rate: u32,

    /// Seconds between decay ticks
    pub score_decay_interval_secs: u64,

    /// Fatigue score at which a fatigue alert fires
    pub drowsiness_score_threshold: u32,

    /// Minimum seconds between fatigue alerts
    pub drowsiness_alert_debounce_secs: u64,

    /// Seconds without a face before the user is considered idle
    pub idle_threshold_secs: u64,

    /// Length of a scheduled eye break (seconds)
    pub break_duration_secs: u64,

    /// Work interval between breaks when settings are unavailable (minutes)
    pub default_work_duration_mins: u64,

    /// Interval between SUMMARY_EAR / SUMMARY_BPM samples (seconds)
    pub summary_interval_secs: u64,

    /// Face frames recorded with eyes open during calibration
    pub calibration_open_frames: usize,

    /// Face frames recorded while blinking during calibration
    pub calibration_blink_frames: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            gaze_tolerance: 0.26,
            head_tilt_down_ratio: 0.22,
            head_tilt_up_ratio: 0.19,
            gaze_stability_frames: 5,
            ear_velocity_threshold: -0.008,
            reopen_hysteresis: 1.1,
            default_ear_threshold: 0.20,
            micro_sleep_threshold_ms: 700,
            yawn_mar_threshold: 0.6,
            yawn_duration_ms: 1500,
            no_blink_threshold_secs: 10,
            stare_alert_debounce_secs: 30,
            blink_rate_window_secs: 60,
            low_blink_rate_bpm: 10.0,
            low_blink_rate_debounce_secs: 30,
            score_increment_long_blink: 5,
            score_increment_yawn: 3,
            score_decay_rate: 1,
            score_decay_interval_secs: 10,
            drowsiness_score_threshold: 9,
            drowsiness_alert_debounce_secs: 10,
            idle_threshold_secs: 45,
            break_duration_secs: 20,
            default_work_duration_mins: 20,
            summary_interval_secs: 15,
            calibration_open_frames: 150,
            calibration_blink_frames: 150,
        }
    }
}

impl DetectorConfig {
    pub fn micro_sleep_threshold(&self) -> Duration {
        Duration::from_millis(self.micro_sleep_threshold_ms)
    }

    pub fn yawn_duration(&self) -> Duration {
        Duration::from_millis(self.yawn_duration_ms)
    }

    pub fn no_blink_threshold(&self) -> Duration {
        Duration::from_secs(self.no_blink_threshold_secs)
    }

    pub fn stare_alert_debounce(&self) -> Duration {
        Duration::from_secs(self.stare_alert_debounce_secs)
    }

    pub fn blink_rate_window(&self) -> Duration {
        Duration::from_secs(self.blink_rate_window_secs)
    }

    pub fn low_blink_rate_debounce(&self) -> Duration {
        Duration::from_secs(self.low_blink_rate_debounce_secs)
    }

    pub fn score_decay_interval(&self) -> Duration {
        Duration::from_secs(self.score_decay_interval_secs)
    }

    pub fn drowsiness_alert_debounce(&self) -> Duration {
        Duration::from_secs(self.drowsiness_alert_debounce_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn break_duration(&self) -> Duration {
        Duration::from_secs(self.break_duration_secs)
    }

    pub fn default_work_duration(&self) -> Duration {
        Duration::from_secs(self.default_work_duration_mins * 60)
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_secs)
    }
}
