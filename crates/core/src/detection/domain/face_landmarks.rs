//! Named facial landmarks in the detector's canonical role order.
//!
//! Detectors report landmarks as a flat point list. The first four entries
//! are, in order, left eye, right eye, nose and mouth; anything after that
//! (BlazeFace also emits both ears) is ignored.

use serde::Serialize;
use thiserror::Error;

use crate::shared::geometry::Point;

const LEFT_EYE: usize = 0;
const RIGHT_EYE: usize = 1;
const NOSE: usize = 2;
const MOUTH: usize = 3;

/// Number of points a detector must supply for a usable landmark set.
pub const REQUIRED_POINTS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("landmark set needs {REQUIRED_POINTS} points (left eye, right eye, nose, mouth), got {got}")]
pub struct LandmarkSchemaError {
    pub got: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LandmarkSet {
    pub left_eye: Point,
    pub right_eye: Point,
    pub nose: Point,
    pub mouth: Point,
}

impl LandmarkSet {
    pub fn new(left_eye: Point, right_eye: Point, nose: Point, mouth: Point) -> Self {
        Self {
            left_eye,
            right_eye,
            nose,
            mouth,
        }
    }

    /// Builds a landmark set from canonically ordered points.
    pub fn from_points(points: &[Point]) -> Result<Self, LandmarkSchemaError> {
        if points.len() < REQUIRED_POINTS {
            return Err(LandmarkSchemaError { got: points.len() });
        }
        Ok(Self {
            left_eye: points[LEFT_EYE],
            right_eye: points[RIGHT_EYE],
            nose: points[NOSE],
            mouth: points[MOUTH],
        })
    }

    /// Points in canonical order, for drawing.
    pub fn points(&self) -> [Point; REQUIRED_POINTS] {
        [self.left_eye, self.right_eye, self.nose, self.mouth]
    }
}
