//! Feature Engineering Engine
//!
//! Turns one frame of face-mesh landmarks into the scalar signals the
//! detector consumes: eye-aspect-ratio, mouth-aspect-ratio, horizontal
//! gaze ratio and nose position. Everything here is stateless.

mod features;
mod landmarks;
mod statistics;

pub use features::{
    eye_aspect_ratio, gaze_ratio, mouth_aspect_ratio, vertical_offset, FrameFeatures,
};
pub use landmarks::{index, FaceLandmarks, Point};
pub use statistics::{mean, MeanAccumulator};

use thiserror::Error;

/// Small constant added to every ratio denominator
pub const EPSILON: f64 = 1e-6;

/// Feature extraction errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeatureError {
    /// Landmark set is shorter than the highest index we read
    #[error("Expected at least {expected} landmarks, got {actual}")]
    InsufficientLandmarks { expected: usize, actual: usize },
}
