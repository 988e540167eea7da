use crate::liveliness::domain::liveliness_state::LivelinessStatus;
use crate::presentation::domain::presentation_sink::{FrameReport, PresentationSink};

/// Logs the status line whenever it changes.
#[derive(Default)]
pub struct LogPresentationSink {
    last: Option<LivelinessStatus>,
    frames: usize,
}

impl LogPresentationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_seen(&self) -> usize {
        self.frames
    }
}

impl PresentationSink for LogPresentationSink {
    fn present(&mut self, report: &FrameReport) {
        self.frames += 1;
        if self.last != Some(report.status) {
            log::info!(
                "Liveliness: {} (frame {}, {} face(s))",
                report.status,
                report.frame_index,
                report.boxes.len()
            );
            self.last = Some(report.status);
        }
    }

    fn fatal(&mut self, message: &str) {
        log::error!("Liveliness: {} ({message})", LivelinessStatus::Unavailable);
        self.last = Some(LivelinessStatus::Unavailable);
    }
}
