//! One-time baseline capture

use crate::config::DetectorConfig;
use crate::DetectorError;
use feature_engine::{FrameFeatures, MeanAccumulator};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Per-user baseline measured during calibration
///
/// Profiles written by older releases lack the face and gaze fields;
/// those deserialize as zero and fail [`CalibrationProfile::is_valid`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    /// Midpoint between open and blinking EAR
    pub ear_threshold: f64,
    pub avg_open_ear: f64,
    /// Forehead-to-chin span, the scale reference for head tilt
    #[serde(default)]
    pub avg_face_height: f64,
    /// Gaze ratio when looking at the screen center
    #[serde(default)]
    pub avg_center_gaze: f64,
    /// Neutral nose-tip y
    #[serde(default)]
    pub avg_nose_y: f64,
}

impl CalibrationProfile {
    /// Every field positive and finite
    pub fn is_valid(&self) -> bool {
        [
            self.ear_threshold,
            self.avg_open_ear,
            self.avg_face_height,
            self.avg_center_gaze,
            self.avg_nose_y,
        ]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0)
    }
}

/// Capture phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationPhase {
    /// User keeps eyes open and looks at the screen center
    OpenEyes,
    /// User blinks naturally
    Blink,
    Done,
}

/// Two-phase sample collector producing a [`CalibrationProfile`]
#[derive(Debug, Clone)]
pub struct CalibrationBuilder {
    phase: CalibrationPhase,
    open_quota: usize,
    blink_quota: usize,
    frames_in_phase: usize,
    open_ears: MeanAccumulator,
    closed_ears: MeanAccumulator,
    face_heights: MeanAccumulator,
    gaze_ratios: MeanAccumulator,
    nose_ys: MeanAccumulator,
}

impl CalibrationBuilder {
    pub fn new(open_quota: usize, blink_quota: usize) -> Self {
        Self {
            phase: CalibrationPhase::OpenEyes,
            open_quota,
            blink_quota,
            frames_in_phase: 0,
            open_ears: MeanAccumulator::new(),
            closed_ears: MeanAccumulator::new(),
            face_heights: MeanAccumulator::new(),
            gaze_ratios: MeanAccumulator::new(),
            nose_ys: MeanAccumulator::new(),
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.calibration_open_frames, config.calibration_blink_frames)
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == CalibrationPhase::Done
    }

    /// Frames recorded in the current phase and that phase's quota
    pub fn progress(&self) -> (usize, usize) {
        match self.phase {
            CalibrationPhase::OpenEyes => (self.frames_in_phase, self.open_quota),
            CalibrationPhase::Blink => (self.frames_in_phase, self.blink_quota),
            CalibrationPhase::Done => (self.blink_quota, self.blink_quota),
        }
    }

    /// Feed one frame; frames without a face do not count toward the quota
    pub fn push(&mut self, features: Option<&FrameFeatures>) -> CalibrationPhase {
        let Some(f) = features else {
            return self.phase;
        };

        match self.phase {
            CalibrationPhase::OpenEyes => {
                if self.frames_in_phase < self.open_quota {
                    self.open_ears.push(f.avg_ear);
                    self.face_heights.push(f.face_height);
                    self.gaze_ratios.push(f.gaze_ratio);
                    self.nose_ys.push(f.nose_y);
                    self.frames_in_phase += 1;
                }
                if self.frames_in_phase >= self.open_quota {
                    debug!("Open-eye phase complete ({} frames)", self.frames_in_phase);
                    self.phase = CalibrationPhase::Blink;
                    self.frames_in_phase = 0;
                }
            }
            CalibrationPhase::Blink => {
                if self.frames_in_phase < self.blink_quota {
                    self.closed_ears.push(f.avg_ear);
                    self.frames_in_phase += 1;
                }
                if self.frames_in_phase >= self.blink_quota {
                    debug!("Blink phase complete ({} frames)", self.frames_in_phase);
                    self.phase = CalibrationPhase::Done;
                }
            }
            CalibrationPhase::Done => {}
        }

        self.phase
    }

    /// Compute the profile from whatever was collected
    ///
    /// Fails when either phase recorded no face at all.
    pub fn finish(self) -> Result<CalibrationProfile, DetectorError> {
        let (Some(open), Some(closed)) = (self.open_ears.mean(), self.closed_ears.mean()) else {
            return Err(DetectorError::CalibrationFailed {
                open_samples: self.open_ears.count(),
                blink_samples: self.closed_ears.count(),
            });
        };

        let profile = CalibrationProfile {
            ear_threshold: (open + closed) / 2.0,
            avg_open_ear: open,
            avg_face_height: self.face_heights.mean().unwrap_or(0.0),
            avg_center_gaze: self.gaze_ratios.mean().unwrap_or(0.0),
            avg_nose_y: self.nose_ys.mean().unwrap_or(0.0),
        };

        info!(
            "Calibration complete: EAR threshold {:.3} (open {:.3}, blinking {:.3})",
            profile.ear_threshold, open, closed
        );
        Ok(profile)
    }
}
