use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver};

use crate::capture::domain::frame_source::{AcquisitionError, FrameSource};
use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_detector::InferenceError;
use crate::liveliness::domain::aggregation_policy::AggregationPolicy;
use crate::liveliness::domain::liveliness_classifier::LivelinessClassifier;
use crate::liveliness::domain::liveliness_state::LivelinessState;
use crate::presentation::domain::presentation_sink::{FrameReport, PresentationSink};
use crate::session::inference_worker::InferenceWorker;
use crate::session::loop_logger::LoopLogger;
use crate::shared::frame::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopPhase {
    Idle = 0,
    WaitingForFrame = 1,
    Detecting = 2,
    Classifying = 3,
    Stopped = 4,
    Failed = 5,
}

impl LoopPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoopPhase::WaitingForFrame,
            2 => LoopPhase::Detecting,
            3 => LoopPhase::Classifying,
            4 => LoopPhase::Stopped,
            5 => LoopPhase::Failed,
            _ => LoopPhase::Idle,
        }
    }
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopPhase::Idle => "idle",
            LoopPhase::WaitingForFrame => "waiting for frame",
            LoopPhase::Detecting => "detecting",
            LoopPhase::Classifying => "classifying",
            LoopPhase::Stopped => "stopped",
            LoopPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Shared, lock-free view of the loop's current phase.
#[derive(Clone, Debug, Default)]
pub struct PhaseCell(Arc<AtomicU8>);

impl PhaseCell {
    pub fn get(&self) -> LoopPhase {
        LoopPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, phase: LoopPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}

/// Slot for the error that ended the loop. Written at most once per run.
pub type LastError = Arc<Mutex<Option<AcquisitionError>>>;

enum Flow {
    Continue,
    Stop,
}

/// One running detection loop.
///
/// Each tick polls the frame source, sends the frame to the inference
/// worker, classifies every detection that carries landmarks and writes
/// one aggregated verdict into the shared state. Inference problems only
/// skip the tick. An acquisition error ends the loop.
pub struct DetectionLoop {
    pub(crate) source: Box<dyn FrameSource>,
    pub(crate) worker: InferenceWorker,
    pub(crate) classifier: LivelinessClassifier,
    pub(crate) policy: AggregationPolicy,
    pub(crate) state: LivelinessState,
    pub(crate) generation: u64,
    pub(crate) sink: Box<dyn PresentationSink>,
    pub(crate) logger: Box<dyn LoopLogger>,
    pub(crate) phase: PhaseCell,
    pub(crate) last_error: LastError,
    pub(crate) tick_interval: Duration,
    pub(crate) inference_timeout: Duration,
}

/// Per-run bookkeeping that does not need to outlive the thread.
#[derive(Default)]
struct TickState {
    /// Sequence number of a request we stopped waiting for.
    abandoned: Option<u64>,
    consecutive_failures: usize,
}

impl DetectionLoop {
    /// Runs until `stop` fires (or its sender is dropped) or the source fails.
    pub fn run(mut self, stop: Receiver<()>) {
        let ticker = crossbeam_channel::tick(self.tick_interval);
        let mut ticks = TickState::default();

        self.phase.set(LoopPhase::WaitingForFrame);
        self.logger.info(&format!(
            "Detection loop started ({:?} tick, {} aggregation)",
            self.tick_interval, self.policy
        ));

        loop {
            select! {
                recv(stop) -> _ => break,
                recv(ticker) -> _ => {}
            }

            match self.tick(&mut ticks, &stop) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) => {
                    self.fail(e);
                    break;
                }
            }
        }

        self.source.close();
        if self.phase.get() != LoopPhase::Failed {
            self.phase.set(LoopPhase::Stopped);
        }
        self.logger.summary();
        log::info!("Detection loop ended ({})", self.phase.get());
    }

    fn tick(
        &mut self,
        ticks: &mut TickState,
        stop: &Receiver<()>,
    ) -> Result<Flow, AcquisitionError> {
        if let Some(seq) = ticks.abandoned {
            if !self.drain_abandoned(seq) {
                return Ok(Flow::Continue);
            }
            ticks.abandoned = None;
        }

        self.phase.set(LoopPhase::WaitingForFrame);
        if !self.source.is_ready()? {
            return Ok(Flow::Continue);
        }
        let frame = self.source.current_frame()?;
        let frame_index = frame.index();
        let size = (frame.width(), frame.height());

        self.phase.set(LoopPhase::Detecting);
        let started = Instant::now();
        let detections = match self.infer(frame, ticks, stop) {
            Ok(Some(detections)) => detections,
            Ok(None) => return Ok(Flow::Stop),
            Err(e) => {
                self.report_inference_failure(ticks, frame_index, &e);
                self.phase.set(LoopPhase::WaitingForFrame);
                return Ok(Flow::Continue);
            }
        };
        ticks.consecutive_failures = 0;
        self.logger
            .timing("detect", started.elapsed().as_secs_f64() * 1000.0);

        self.phase.set(LoopPhase::Classifying);
        let started = Instant::now();
        self.classify_and_publish(frame_index, &detections);
        self.logger
            .timing("classify", started.elapsed().as_secs_f64() * 1000.0);
        self.logger.metric("faces", detections.len() as f64);

        let report =
            FrameReport::from_detections(frame_index, size, &detections, self.state.status());
        self.sink.present(&report);
        self.logger.frame_done(frame_index);

        self.phase.set(LoopPhase::WaitingForFrame);
        Ok(Flow::Continue)
    }

    /// Waits for the reply to this frame. `Ok(None)` means a stop request
    /// arrived first.
    fn infer(
        &mut self,
        frame: Frame,
        ticks: &mut TickState,
        stop: &Receiver<()>,
    ) -> Result<Option<Vec<Detection>>, InferenceError> {
        let seq = self.worker.submit(frame)?;
        let deadline = crossbeam_channel::at(Instant::now() + self.inference_timeout);
        let replies = self.worker.replies().clone();

        loop {
            select! {
                recv(stop) -> _ => return Ok(None),
                recv(replies) -> msg => match msg {
                    Ok(reply) if reply.seq == seq => return reply.result.map(Some),
                    Ok(reply) => log::debug!("Discarding stale inference reply #{}", reply.seq),
                    Err(_) => return Err(InferenceError::WorkerGone),
                },
                recv(deadline) -> _ => {
                    ticks.abandoned = Some(seq);
                    return Err(InferenceError::TimedOut(self.inference_timeout));
                }
            }
        }
    }

    /// Returns `true` once the abandoned request's reply has been consumed
    /// (or can never arrive), so a new frame may be submitted.
    fn drain_abandoned(&mut self, seq: u64) -> bool {
        loop {
            match self.worker.replies().try_recv() {
                Ok(reply) if reply.seq == seq => {
                    log::debug!("Discarding late inference reply #{seq}");
                    return true;
                }
                Ok(reply) => log::debug!("Discarding stale inference reply #{}", reply.seq),
                Err(crossbeam_channel::TryRecvError::Empty) => return false,
                Err(crossbeam_channel::TryRecvError::Disconnected) => return true,
            }
        }
    }

    fn classify_and_publish(&mut self, frame_index: usize, detections: &[Detection]) {
        let verdicts: Vec<bool> = detections
            .iter()
            .filter_map(|d| d.landmarks.as_ref())
            .map(|landmarks| {
                let m = LivelinessClassifier::measure(landmarks);
                let lively = self.classifier.classify(landmarks);
                log::debug!(
                    "Frame {frame_index}: eye asymmetry {:.1}, mouth offset {:.1} -> {}",
                    m.eye_asymmetry,
                    m.mouth_offset,
                    if lively { "lively" } else { "not lively" }
                );
                lively
            })
            .collect();

        if let Some(verdict) = self.policy.aggregate(verdicts) {
            if !self.state.publish(self.generation, verdict) {
                log::debug!("Frame {frame_index}: verdict dropped, session already stopped");
            }
        }
    }

    fn report_inference_failure(
        &mut self,
        ticks: &mut TickState,
        frame_index: usize,
        error: &InferenceError,
    ) {
        ticks.consecutive_failures += 1;
        if ticks.consecutive_failures == 1 {
            log::warn!("Frame {frame_index}: inference skipped: {error}");
        } else {
            log::debug!(
                "Frame {frame_index}: inference skipped ({} in a row): {error}",
                ticks.consecutive_failures
            );
        }
        self.logger.metric("inference_failures", 1.0);
    }

    fn fail(&mut self, error: AcquisitionError) {
        log::error!("Frame acquisition failed, stopping detection: {error}");
        {
            let mut slot = self.last_error.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                *slot = Some(error.clone());
            }
        }
        self.state.mark_unavailable(self.generation);
        self.sink.fatal(&error.to_string());
        self.phase.set(LoopPhase::Failed);
    }
}
