//! Face-mesh landmark container and the semantic indices we read from it

use serde::{Deserialize, Serialize};

/// Face-mesh landmark indices (468/478-point topology)
pub mod index {
    /// Right eye contour: outer corner, two upper lid points, inner corner, two lower lid points
    pub const RIGHT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
    /// Left eye contour, same ordering as [`RIGHT_EYE`]
    pub const LEFT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
    /// Outer corner on the image-left side
    pub const LEFT_EYE_CORNER: usize = 130;
    /// Outer corner on the image-right side
    pub const RIGHT_EYE_CORNER: usize = 359;
    pub const NOSE_TIP: usize = 1;
    pub const TOP_LIP: usize = 13;
    pub const BOTTOM_LIP: usize = 14;
    pub const MOUTH_LEFT: usize = 61;
    pub const MOUTH_RIGHT: usize = 291;
    pub const FOREHEAD: usize = 10;
    pub const CHIN: usize = 152;

    /// Smallest landmark count that covers every index above
    pub const REQUIRED: usize = 388;
}

/// Normalized 2-D landmark coordinate (0..1 of frame width/height)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

/// One detected face, as delivered by the external landmark producer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceLandmarks {
    points: Vec<Point>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Landmark at a mesh index
    ///
    /// Callers validate the length first; see `FrameFeatures::extract`.
    pub fn point(&self, idx: usize) -> Point {
        self.points[idx]
    }

    /// Mutable access, used to synthesize faces in tests and replays
    pub fn set(&mut self, idx: usize, point: Point) {
        if idx >= self.points.len() {
            self.points.resize(idx + 1, Point::default());
        }
        self.points[idx] = point;
    }

    pub(crate) fn eye(&self, indices: &[usize; 6]) -> [Point; 6] {
        indices.map(|i| self.points[i])
    }
}
