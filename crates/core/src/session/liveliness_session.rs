use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use thiserror::Error;

use crate::capture::domain::frame_source::{AcquisitionError, FrameSource};
use crate::detection::domain::face_detector::{FaceDetector, ModelLoadError};
use crate::liveliness::domain::liveliness_classifier::LivelinessClassifier;
use crate::liveliness::domain::liveliness_state::{LivelinessState, LivelinessStatus};
use crate::presentation::domain::presentation_sink::PresentationSink;
use crate::session::detection_loop::{DetectionLoop, LastError, LoopPhase, PhaseCell};
use crate::session::inference_worker::InferenceWorker;
use crate::session::loop_logger::{LoopLogger, StatsLoopLogger};
use crate::session::session_config::{ConfigError, SessionConfig};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error("session is already running")]
    AlreadyRunning,
    #[error("failed to start {thread} thread: {source}")]
    Spawn {
        thread: &'static str,
        #[source]
        source: std::io::Error,
    },
}

struct Running {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns one liveliness session: model, capture device and detection loop.
///
/// `start` loads the model first and opens the device second, so a model
/// failure never touches the camera. Either failure leaves the session
/// idle. `stop` cancels the loop, waits for it to release the device and
/// fences off any inference result still on its way.
pub struct LivelinessSession {
    config: SessionConfig,
    state: LivelinessState,
    phase: PhaseCell,
    last_error: LastError,
    loop_logger: Option<Box<dyn LoopLogger>>,
    running: Option<Running>,
}

impl LivelinessSession {
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            config,
            state: LivelinessState::new(),
            phase: PhaseCell::default(),
            last_error: Arc::new(Mutex::new(None)),
            loop_logger: None,
            running: None,
        })
    }

    /// Replaces the logger used by the next run. Defaults to [`StatsLoopLogger`].
    pub fn set_loop_logger(&mut self, logger: Box<dyn LoopLogger>) {
        self.loop_logger = Some(logger);
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn start<L, O>(
        &mut self,
        load_detector: L,
        open_source: O,
        sink: Box<dyn PresentationSink>,
    ) -> Result<(), SessionError>
    where
        L: FnOnce() -> Result<Box<dyn FaceDetector>, ModelLoadError>,
        O: FnOnce() -> Result<Box<dyn FrameSource>, AcquisitionError>,
    {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }
        // A loop that ended on its own still holds a joinable handle.
        self.stop();

        let detector = load_detector()?;
        log::info!("Face detector loaded");

        let mut source = open_source()?;
        let (width, height) = source
            .dimensions()
            .unwrap_or_else(|| self.config.default_size());
        log::info!("Frame source opened ({width}x{height})");

        let worker = match InferenceWorker::spawn(detector) {
            Ok(worker) => worker,
            Err(source_err) => {
                source.close();
                return Err(SessionError::Spawn {
                    thread: "inference",
                    source: source_err,
                });
            }
        };

        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = None;
        let generation = self.state.reset();

        let detection_loop = DetectionLoop {
            source,
            worker,
            classifier: LivelinessClassifier::new(self.config.thresholds),
            policy: self.config.aggregation,
            state: self.state.clone(),
            generation,
            sink,
            logger: self
                .loop_logger
                .take()
                .unwrap_or_else(|| Box::new(StatsLoopLogger::default())),
            phase: self.phase.clone(),
            last_error: self.last_error.clone(),
            tick_interval: self.config.tick_interval(),
            inference_timeout: self.config.inference_timeout(),
        };

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("liveliness-loop".into())
            .spawn(move || detection_loop.run(stop_rx))
            .map_err(|source| {
                self.state.retire();
                SessionError::Spawn {
                    thread: "detection loop",
                    source,
                }
            })?;

        self.running = Some(Running { stop_tx, handle });
        Ok(())
    }

    /// Cancels the loop and waits for it to finish. No verdict is written
    /// after this returns. Calling it on an idle session does nothing.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        self.state.retire();
        let _ = running.stop_tx.try_send(());
        drop(running.stop_tx);

        if running.handle.join().is_err() {
            log::error!("Detection loop panicked");
            self.phase.set(LoopPhase::Failed);
        }
        log::info!("Liveliness session stopped");
    }

    /// `false` once the loop has exited, including after a fatal error.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Handle to the shared verdict; clones observe later updates.
    pub fn state(&self) -> LivelinessState {
        self.state.clone()
    }

    pub fn status(&self) -> LivelinessStatus {
        self.state.status()
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase.get()
    }

    /// The acquisition error that ended the latest run, if any.
    pub fn last_error(&self) -> Option<AcquisitionError> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Drop for LivelinessSession {
    fn drop(&mut self) {
        self.stop();
    }
}
