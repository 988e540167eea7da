//! Single-frame liveliness heuristic over eye and mouth landmarks.
//!
//! A photo held up to the camera keeps the eye line level and the mouth at
//! a fixed distance below the nose. Head tilt, facial micro-motion and
//! speech push one of those vertical deltas past a few pixels. The check
//! looks at one landmark set at a time and keeps no memory between frames.

use serde::{Deserialize, Serialize};

use crate::detection::domain::face_landmarks::LandmarkSet;
use crate::shared::constants::{DEFAULT_EYE_THRESHOLD, DEFAULT_MOUTH_THRESHOLD};

/// Pixel cutoffs above which a face counts as lively.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LivelinessThresholds {
    /// Vertical eye-line asymmetry cutoff.
    pub eye: f32,
    /// Vertical mouth-to-nose offset cutoff.
    pub mouth: f32,
}

impl Default for LivelinessThresholds {
    fn default() -> Self {
        Self {
            eye: DEFAULT_EYE_THRESHOLD,
            mouth: DEFAULT_MOUTH_THRESHOLD,
        }
    }
}

/// The two vertical deltas the verdict is based on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LandmarkMeasurements {
    pub eye_asymmetry: f32,
    pub mouth_offset: f32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LivelinessClassifier {
    thresholds: LivelinessThresholds,
}

impl LivelinessClassifier {
    pub fn new(thresholds: LivelinessThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> LivelinessThresholds {
        self.thresholds
    }

    pub fn measure(landmarks: &LandmarkSet) -> LandmarkMeasurements {
        LandmarkMeasurements {
            eye_asymmetry: (landmarks.left_eye.y - landmarks.right_eye.y).abs(),
            mouth_offset: (landmarks.mouth.y - landmarks.nose.y).abs(),
        }
    }

    /// Strictly greater than either cutoff; values exactly at a cutoff are not lively.
    pub fn classify(&self, landmarks: &LandmarkSet) -> bool {
        let m = Self::measure(landmarks);
        m.eye_asymmetry > self.thresholds.eye || m.mouth_offset > self.thresholds.mouth
    }
}
