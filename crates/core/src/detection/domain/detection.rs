use serde::Serialize;

use crate::detection::domain::face_landmarks::LandmarkSet;
use crate::shared::geometry::BoundingBox;

/// One face found in one frame.
///
/// Detections carry no identity: a face in frame N is unrelated to any
/// face in frame N+1.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    /// `None` when the detector located the face but not its landmarks.
    pub landmarks: Option<LandmarkSet>,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bounding_box: BoundingBox, landmarks: Option<LandmarkSet>, confidence: f32) -> Self {
        Self {
            bounding_box,
            landmarks,
            confidence,
        }
    }
}
