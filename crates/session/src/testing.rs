//! Synthetic frames for tests

use crate::source::LandmarkFrame;
use feature_engine::{index, FaceLandmarks, Point};

/// A frontal face with both eyes open by `opening` (0.03 gives an EAR of 0.3)
pub(crate) fn face(opening: f64) -> LandmarkFrame {
    let mut face = FaceLandmarks::new(vec![Point::default(); 478]);
    for (indices, x0) in [(index::RIGHT_EYE, 0.35), (index::LEFT_EYE, 0.55)] {
        let contour = [
            (0.0, 0.0),
            (1.0 / 30.0, -opening / 2.0),
            (2.0 / 30.0, -opening / 2.0),
            (0.1, 0.0),
            (2.0 / 30.0, opening / 2.0),
            (1.0 / 30.0, opening / 2.0),
        ];
        for (i, (dx, dy)) in indices.iter().zip(contour) {
            face.set(*i, Point::new(x0 + dx, 0.4 + dy));
        }
    }
    face.set(index::LEFT_EYE_CORNER, Point::new(0.3, 0.4));
    face.set(index::RIGHT_EYE_CORNER, Point::new(0.7, 0.4));
    face.set(index::NOSE_TIP, Point::new(0.5, 0.5));
    face.set(index::TOP_LIP, Point::new(0.5, 0.6));
    face.set(index::BOTTOM_LIP, Point::new(0.5, 0.61));
    face.set(index::MOUTH_LEFT, Point::new(0.4, 0.62));
    face.set(index::MOUTH_RIGHT, Point::new(0.6, 0.62));
    face.set(index::FOREHEAD, Point::new(0.5, 0.2));
    face.set(index::CHIN, Point::new(0.5, 0.8));
    LandmarkFrame::face(face)
}
