use std::collections::HashMap;
use std::time::Instant;

/// Observer for detection-loop events: per-stage timings, per-frame
/// metrics and lifecycle messages.
pub trait LoopLogger: Send {
    /// Called once per frame that made it through classification.
    fn frame_done(&mut self, frame_index: usize);

    /// Record how long a named stage (`detect`, `classify`) took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. `faces`).
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Emitted when the loop ends. Default: no-op.
    fn summary(&self) {}
}

pub struct NullLoopLogger;

impl LoopLogger for NullLoopLogger {
    fn frame_done(&mut self, _frame_index: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Accumulates timings and metrics and logs a summary when the loop ends.
///
/// A heartbeat goes to `debug` every `heartbeat_frames` frames.
pub struct StatsLoopLogger {
    heartbeat_frames: usize,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    frames: usize,
}

impl StatsLoopLogger {
    pub fn new(heartbeat_frames: usize) -> Self {
        Self {
            heartbeat_frames: heartbeat_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            frames: 0,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// `None` until at least one frame has been recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.frames == 0 {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Detection loop summary ({} frames, {elapsed_s:.1}s):",
            self.frames
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let values = &self.timings[stage];
            let max = values.iter().copied().fold(0.0_f64, f64::max);
            lines.push(format!(
                "  {stage:10}: avg {:6.1}ms  max {max:6.1}ms",
                mean(values)
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            lines.push(format!("  {name}: avg {:.1}", mean(&self.metrics[name])));
        }

        if elapsed_s > 0.0 {
            lines.push(format!(
                "  Rate: {:.1} frames/s",
                self.frames as f64 / elapsed_s
            ));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }
}

impl Default for StatsLoopLogger {
    fn default() -> Self {
        Self::new(120)
    }
}

impl LoopLogger for StatsLoopLogger {
    fn frame_done(&mut self, frame_index: usize) {
        self.frames += 1;
        if self.frames % self.heartbeat_frames == 0 {
            log::debug!("Processed {} frames (latest #{frame_index})", self.frames);
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_accepts_everything() {
        let mut logger = NullLoopLogger;
        logger.frame_done(0);
        logger.timing("detect", 5.0);
        logger.metric("faces", 1.0);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_records_timings_per_stage() {
        let mut logger = StatsLoopLogger::new(10);
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("classify", 0.5);

        assert_eq!(logger.timings_for("detect").unwrap(), &[20.0, 30.0]);
        assert_eq!(logger.timings_for("classify").unwrap().len(), 1);
        assert!(logger.timings_for("render").is_none());
    }

    #[test]
    fn test_metric_average() {
        let mut logger = StatsLoopLogger::new(10);
        logger.metric("faces", 1.0);
        logger.metric("faces", 2.0);
        assert_relative_eq!(mean(logger.metrics_for("faces").unwrap()), 1.5);
    }

    #[test]
    fn test_summary_needs_frames() {
        let mut logger = StatsLoopLogger::new(10);
        logger.timing("detect", 10.0);
        assert!(logger.summary_string().is_none());

        logger.frame_done(0);
        logger.metric("faces", 2.0);
        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Detection loop summary (1 frames"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("faces: avg 2.0"));
    }

    #[test]
    fn test_frames_counted() {
        let mut logger = StatsLoopLogger::default();
        for i in 0..5 {
            logger.frame_done(i);
        }
        assert_eq!(logger.frames(), 5);
        assert_eq!(logger.heartbeat_frames, 120);
    }

    #[test]
    fn test_mean_of_empty_is_zero() {
        assert_relative_eq!(mean(&[]), 0.0);
    }
}
