use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_landmarks::LandmarkSchemaError;
use crate::shared::frame::Frame;

/// Per-frame inference failure. Never fatal to a session.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    Failed(String),
    #[error("inference did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("detector returned malformed landmarks: {0}")]
    Schema(#[from] LandmarkSchemaError),
    #[error("inference worker is no longer running")]
    WorkerGone,
}

impl From<ort::Error> for InferenceError {
    fn from(e: ort::Error) -> Self {
        InferenceError::Failed(e.to_string())
    }
}

/// The detector model could not be made ready. Fatal: the session cannot start.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to resolve model: {0}")]
    Resolve(#[from] crate::shared::model_resolver::ModelResolveError),
    #[error("failed to load model {path}: {reason}")]
    Session { path: PathBuf, reason: String },
}

/// Domain interface for face detection.
///
/// Each call looks at one frame only; implementations must not carry
/// detections across calls.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, InferenceError>;
}
