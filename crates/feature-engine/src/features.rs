//! Per-frame geometric features

use crate::landmarks::{index, FaceLandmarks, Point};
use crate::{FeatureError, EPSILON};
use serde::{Deserialize, Serialize};

/// Eye-aspect-ratio of a six-point eye contour
///
/// Mean of the two lid-to-lid distances over twice the corner-to-corner
/// width. Open eyes sit around 0.25-0.35; a closed eye drops toward zero.
pub fn eye_aspect_ratio(points: &[Point; 6]) -> f64 {
    let v1 = points[1].distance(&points[5]);
    let v2 = points[2].distance(&points[4]);
    let h = points[0].distance(&points[3]);
    (v1 + v2) / (2.0 * h + EPSILON)
}

/// Mouth-aspect-ratio: lip gap over mouth width
pub fn mouth_aspect_ratio(top: Point, bottom: Point, left: Point, right: Point) -> f64 {
    top.distance(&bottom) / (left.distance(&right) + EPSILON)
}

/// Horizontal nose position between the two outer eye corners
///
/// Around 0.5 when facing the camera, drifting toward 0 or 1 as the
/// head turns.
pub fn gaze_ratio(nose_x: f64, left_corner_x: f64, right_corner_x: f64) -> f64 {
    (nose_x - left_corner_x) / (right_corner_x - left_corner_x + EPSILON)
}

/// Nose displacement from its neutral position, in face heights
///
/// Positive values mean the nose moved down the frame (head pitched
/// down). Returns `None` without a usable face-height reference.
pub fn vertical_offset(nose_y: f64, neutral_nose_y: f64, face_height: f64) -> Option<f64> {
    if face_height > 0.0 {
        Some((nose_y - neutral_nose_y) / face_height)
    } else {
        None
    }
}

/// Scalar signals extracted from one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameFeatures {
    /// Mean EAR of both eyes
    pub avg_ear: f64,
    /// Mouth-aspect-ratio
    pub mar: f64,
    /// Horizontal gaze ratio
    pub gaze_ratio: f64,
    /// Nose tip y (normalized)
    pub nose_y: f64,
    /// Forehead-to-chin span (normalized)
    pub face_height: f64,
}

impl FrameFeatures {
    /// Extract all features from a landmark set
    pub fn extract(landmarks: &FaceLandmarks) -> Result<Self, FeatureError> {
        if landmarks.len() < index::REQUIRED {
            return Err(FeatureError::InsufficientLandmarks {
                expected: index::REQUIRED,
                actual: landmarks.len(),
            });
        }

        let left = eye_aspect_ratio(&landmarks.eye(&index::LEFT_EYE));
        let right = eye_aspect_ratio(&landmarks.eye(&index::RIGHT_EYE));

        let mar = mouth_aspect_ratio(
            landmarks.point(index::TOP_LIP),
            landmarks.point(index::BOTTOM_LIP),
            landmarks.point(index::MOUTH_LEFT),
            landmarks.point(index::MOUTH_RIGHT),
        );

        let nose = landmarks.point(index::NOSE_TIP);
        let gaze = gaze_ratio(
            nose.x,
            landmarks.point(index::LEFT_EYE_CORNER).x,
            landmarks.point(index::RIGHT_EYE_CORNER).x,
        );

        let face_height =
            (landmarks.point(index::CHIN).y - landmarks.point(index::FOREHEAD).y).abs();

        Ok(Self {
            avg_ear: (left + right) / 2.0,
            mar,
            gaze_ratio: gaze,
            nose_y: nose.y,
            face_height,
        })
    }
}
