use std::io::Write;

use serde::Serialize;

use crate::presentation::domain::presentation_sink::{FrameReport, PresentationSink};

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Line<'a> {
    Frame(&'a FrameReport),
    Fatal { message: &'a str },
}

/// Writes one JSON object per processed frame.
///
/// Write failures are logged once and further output is dropped, so a
/// closed pipe never disturbs the detection loop.
pub struct JsonLinesSink<W: Write + Send> {
    out: W,
    broken: bool,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, broken: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: &Line<'_>) {
        if self.broken {
            return;
        }
        let result = serde_json::to_writer(&mut self.out, line)
            .map_err(std::io::Error::from)
            .and_then(|_| self.out.write_all(b"\n"))
            .and_then(|_| self.out.flush());
        if let Err(e) = result {
            log::warn!("JSON output disabled: {e}");
            self.broken = true;
        }
    }
}

impl<W: Write + Send> PresentationSink for JsonLinesSink<W> {
    fn present(&mut self, report: &FrameReport) {
        self.emit(&Line::Frame(report));
    }

    fn fatal(&mut self, message: &str) {
        self.emit(&Line::Fatal { message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection::Detection;
    use crate::detection::domain::face_landmarks::LandmarkSet;
    use crate::liveliness::domain::liveliness_state::LivelinessStatus;
    use crate::shared::geometry::{BoundingBox, Point};

    #[test]
    fn test_writes_one_object_per_frame() {
        let det = Detection::new(
            BoundingBox::new(Point::new(1.0, 2.0), Point::new(11.0, 12.0)),
            Some(LandmarkSet::new(
                Point::new(3.0, 4.0),
                Point::new(8.0, 4.0),
                Point::new(5.0, 6.0),
                Point::new(5.0, 9.0),
            )),
            0.9,
        );
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.present(&FrameReport::from_detections(
            0,
            (640, 480),
            &[det],
            LivelinessStatus::NotLively,
        ));
        sink.present(&FrameReport::from_detections(
            1,
            (640, 480),
            &[],
            LivelinessStatus::Lively,
        ));

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "frame");
        assert_eq!(lines[0]["status"], "not_lively");
        assert_eq!(lines[0]["boxes"][0]["top_left"]["x"], 1.0);
        assert_eq!(lines[0]["landmarks"][0]["mouth"]["y"], 9.0);
        assert_eq!(lines[1]["status"], "lively");
    }

    #[test]
    fn test_fatal_line() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.fatal("device lost");
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let v: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(v["event"], "fatal");
        assert_eq!(v["message"], "device lost");
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_disables_output() {
        let mut sink = JsonLinesSink::new(FailingWriter);
        sink.fatal("x");
        assert!(sink.broken);
        sink.fatal("y");
    }
}
