use std::path::{Path, PathBuf};

use crate::capture::domain::frame_source::{AcquisitionError, FrameSource};
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Replays a directory of still images as if they came from a camera.
///
/// Files are read in name order and the sequence loops forever. Each call
/// to `current_frame` advances to the next image, so every tick sees a
/// fresh frame.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    frames_served: usize,
    dimensions: Option<(u32, u32)>,
    closed: bool,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self, AcquisitionError> {
        let entries = std::fs::read_dir(dir).map_err(|e| AcquisitionError::DeviceUnavailable {
            device: dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_image(p))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(AcquisitionError::Empty(dir.to_path_buf()));
        }

        log::info!("Replaying {} images from {}", paths.len(), dir.display());

        Ok(Self {
            paths,
            cursor: 0,
            frames_served: 0,
            dimensions: None,
            closed: false,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn is_ready(&mut self) -> Result<bool, AcquisitionError> {
        if self.closed {
            return Err(AcquisitionError::StreamEnded("source closed".into()));
        }
        Ok(true)
    }

    fn current_frame(&mut self) -> Result<Frame, AcquisitionError> {
        if self.closed {
            return Err(AcquisitionError::StreamEnded("source closed".into()));
        }
        let path = &self.paths[self.cursor];
        let frame = load_rgb(path, self.frames_served)?;

        self.dimensions = Some((frame.width(), frame.height()));
        self.cursor = (self.cursor + 1) % self.paths.len();
        self.frames_served += 1;
        Ok(frame)
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }
}

fn load_rgb(path: &Path, index: usize) -> Result<Frame, AcquisitionError> {
    let img = image::open(path)
        .map_err(|e| AcquisitionError::Decode(format!("{}: {e}", path.display())))?
        .into_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(img.into_raw(), width, height, 3, index))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
