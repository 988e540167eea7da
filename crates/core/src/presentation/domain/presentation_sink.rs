use serde::Serialize;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_landmarks::LandmarkSet;
use crate::liveliness::domain::liveliness_state::LivelinessStatus;
use crate::shared::geometry::BoundingBox;

/// Everything the presentation layer may draw for one processed frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame_index: usize,
    pub width: u32,
    pub height: u32,
    pub boxes: Vec<BoundingBox>,
    pub landmarks: Vec<LandmarkSet>,
    pub status: LivelinessStatus,
}

impl FrameReport {
    pub fn from_detections(
        frame_index: usize,
        (width, height): (u32, u32),
        detections: &[Detection],
        status: LivelinessStatus,
    ) -> Self {
        Self {
            frame_index,
            width,
            height,
            boxes: detections.iter().map(|d| d.bounding_box).collect(),
            landmarks: detections.iter().filter_map(|d| d.landmarks).collect(),
            status,
        }
    }
}

/// Output port for drawing and status display. Nothing flows back.
pub trait PresentationSink: Send {
    fn present(&mut self, report: &FrameReport);

    /// Called once when the session stops on a fatal error.
    fn fatal(&mut self, _message: &str) {}
}

/// Forwards to several sinks in order.
pub struct FanoutPresentationSink {
    sinks: Vec<Box<dyn PresentationSink>>,
}

impl FanoutPresentationSink {
    pub fn new(sinks: Vec<Box<dyn PresentationSink>>) -> Self {
        Self { sinks }
    }
}

impl PresentationSink for FanoutPresentationSink {
    fn present(&mut self, report: &FrameReport) {
        for sink in &mut self.sinks {
            sink.present(report);
        }
    }

    fn fatal(&mut self, message: &str) {
        for sink in &mut self.sinks {
            sink.fatal(message);
        }
    }
}
