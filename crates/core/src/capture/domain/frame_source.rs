use std::path::PathBuf;

use thiserror::Error;

use crate::shared::frame::Frame;

/// The capture device could not be opened or stopped producing frames.
/// Fatal: a session that sees this stops its detection loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    #[error("capture device {device} unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },
    #[error("capture stream ended: {0}")]
    StreamEnded(String),
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("no frames found in {0}")]
    Empty(PathBuf),
    #[error("no frame ready")]
    NotReady,
}

/// A live supply of frames, polled once per scheduling tick.
pub trait FrameSource: Send {
    /// Non-blocking: `true` once a decodable frame is buffered.
    fn is_ready(&mut self) -> Result<bool, AcquisitionError>;

    /// The most recent frame. Only valid to call after `is_ready` returned `true`.
    fn current_frame(&mut self) -> Result<Frame, AcquisitionError>;

    /// Releases the device. Further calls report [`AcquisitionError::StreamEnded`].
    fn close(&mut self);

    /// Frame size in pixels, once known.
    fn dimensions(&self) -> Option<(u32, u32)> {
        None
    }
}
