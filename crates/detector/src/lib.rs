//! Fatigue detection
//!
//! Turns per-frame face features into discrete wellness events:
//! - Blink detection with velocity onset and reopen hysteresis
//! - Micro-sleep (long blink with head nod)
//! - Yawn detection
//! - Stare and low blink-rate alerts
//! - Decaying fatigue score with debounced alerts
//! - Idle/active tracking and scheduled eye breaks

pub mod analysis;
pub mod calibration;
pub mod config;
pub mod detector;
pub mod state;

pub use analysis::{DetectorEvent, EventType, FrameAnalysis};
pub use calibration::{CalibrationBuilder, CalibrationPhase, CalibrationProfile};
pub use config::DetectorConfig;
pub use detector::FatigueDetector;
pub use state::{DetectorState, EyeState, FatigueScore, UserStatus};

use feature_engine::FeatureError;
use thiserror::Error;

/// Detector error types
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Calibration failed: {open_samples} open-eye and {blink_samples} blink samples with a face")]
    CalibrationFailed {
        open_samples: usize,
        blink_samples: usize,
    },

    #[error("Feature extraction failed: {0}")]
    Feature(#[from] FeatureError),
}
