use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};

use crate::presentation::domain::presentation_sink::{FrameReport, PresentationSink};
use crate::shared::geometry::{BoundingBox, Point};

const BOX_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const LANDMARK_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const BOX_STROKE: i64 = 2;
const LANDMARK_RADIUS: i64 = 2;

/// Renders each report onto a transparent overlay the size of the frame
/// (boxes in green, landmarks as red dots) and saves every `every_n`-th
/// overlay as a PNG.
///
/// The overlay is cleared before each frame, so it only ever shows the
/// latest detections.
pub struct OverlayImageSink {
    output_dir: PathBuf,
    every_n: usize,
    canvas: RgbaImage,
    written: usize,
}

impl OverlayImageSink {
    pub fn new(output_dir: &Path, every_n: usize) -> std::io::Result<Self> {
        std::fs::create_dir_all(output_dir)?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            every_n: every_n.max(1),
            canvas: RgbaImage::new(0, 0),
            written: 0,
        })
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Clears the canvas (resizing it if needed) and draws the report.
    pub fn render(&mut self, report: &FrameReport) -> &RgbaImage {
        if self.canvas.dimensions() != (report.width, report.height) {
            self.canvas = RgbaImage::new(report.width, report.height);
        } else {
            self.canvas.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
        }

        for b in &report.boxes {
            stroke_rect(&mut self.canvas, b);
        }
        for lm in &report.landmarks {
            for p in lm.points() {
                fill_circle(&mut self.canvas, p, LANDMARK_RADIUS);
            }
        }
        &self.canvas
    }
}

impl PresentationSink for OverlayImageSink {
    fn present(&mut self, report: &FrameReport) {
        self.render(report);
        if report.frame_index % self.every_n != 0 {
            return;
        }
        let path = self
            .output_dir
            .join(format!("overlay_{:06}.png", report.frame_index));
        match self.canvas.save(&path) {
            Ok(()) => self.written += 1,
            Err(e) => log::warn!("Failed to write overlay {}: {e}", path.display()),
        }
    }
}

fn put(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
        canvas.put_pixel(x as u32, y as u32, color);
    }
}

fn stroke_rect(canvas: &mut RgbaImage, b: &BoundingBox) {
    let x1 = b.top_left.x.round() as i64;
    let y1 = b.top_left.y.round() as i64;
    let x2 = b.bottom_right.x.round() as i64;
    let y2 = b.bottom_right.y.round() as i64;

    for t in 0..BOX_STROKE {
        for x in x1..=x2 {
            put(canvas, x, y1 + t, BOX_COLOR);
            put(canvas, x, y2 - t, BOX_COLOR);
        }
        for y in y1..=y2 {
            put(canvas, x1 + t, y, BOX_COLOR);
            put(canvas, x2 - t, y, BOX_COLOR);
        }
    }
}

fn fill_circle(canvas: &mut RgbaImage, center: Point, radius: i64) {
    let cx = center.x.round() as i64;
    let cy = center.y.round() as i64;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put(canvas, cx + dx, cy + dy, LANDMARK_COLOR);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection::Detection;
    use crate::detection::domain::face_landmarks::LandmarkSet;
    use crate::liveliness::domain::liveliness_state::LivelinessStatus;
    use tempfile::TempDir;

    fn report(index: usize) -> FrameReport {
        let det = Detection::new(
            BoundingBox::new(Point::new(10.0, 10.0), Point::new(40.0, 40.0)),
            Some(LandmarkSet::new(
                Point::new(18.0, 20.0),
                Point::new(32.0, 20.0),
                Point::new(25.0, 27.0),
                Point::new(25.0, 34.0),
            )),
            0.9,
        );
        FrameReport::from_detections(index, (64, 48), &[det], LivelinessStatus::NotLively)
    }

    #[test]
    fn test_render_draws_box_and_landmarks() {
        let tmp = TempDir::new().unwrap();
        let mut sink = OverlayImageSink::new(tmp.path(), 1).unwrap();
        let canvas = sink.render(&report(0));

        assert_eq!(canvas.dimensions(), (64, 48));
        assert_eq!(*canvas.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(11, 25), BOX_COLOR); // second stroke column
        assert_eq!(*canvas.get_pixel(25, 27), LANDMARK_COLOR); // nose
        assert_eq!(canvas.get_pixel(0, 0)[3], 0); // transparent background
        assert_eq!(canvas.get_pixel(25, 15)[3], 0); // inside box, away from dots
    }

    #[test]
    fn test_canvas_is_cleared_between_frames() {
        let tmp = TempDir::new().unwrap();
        let mut sink = OverlayImageSink::new(tmp.path(), 1).unwrap();
        sink.render(&report(0));
        let empty = FrameReport::from_detections(1, (64, 48), &[], LivelinessStatus::NotLively);
        let canvas = sink.render(&empty);
        assert!(canvas.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_saves_every_nth_frame() {
        let tmp = TempDir::new().unwrap();
        let mut sink = OverlayImageSink::new(tmp.path(), 2).unwrap();
        for i in 0..5 {
            sink.present(&report(i));
        }
        assert_eq!(sink.written(), 3);
        assert!(tmp.path().join("overlay_000000.png").exists());
        assert!(!tmp.path().join("overlay_000001.png").exists());
        assert!(tmp.path().join("overlay_000004.png").exists());
    }

    #[test]
    fn test_drawing_outside_canvas_is_clipped() {
        let mut canvas = RgbaImage::new(4, 4);
        fill_circle(&mut canvas, Point::new(-10.0, -10.0), 2);
        stroke_rect(
            &mut canvas,
            &BoundingBox::new(Point::new(-5.0, -5.0), Point::new(100.0, 100.0)),
        );
        assert!(canvas.pixels().all(|p| p[3] == 0));
    }
}
