use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::{select, Receiver};

use liveliness_core::capture::domain::frame_source::{AcquisitionError, FrameSource};
use liveliness_core::capture::infrastructure::ffmpeg_camera_source::{
    CameraSettings, FfmpegCameraSource,
};
use liveliness_core::capture::infrastructure::image_sequence_source::ImageSequenceSource;
use liveliness_core::detection::domain::face_detector::{FaceDetector, ModelLoadError};
use liveliness_core::detection::infrastructure::onnx_blazeface_detector::OnnxBlazefaceDetector;
use liveliness_core::liveliness::domain::aggregation_policy::AggregationPolicy;
use liveliness_core::presentation::domain::presentation_sink::{
    FanoutPresentationSink, PresentationSink,
};
use liveliness_core::presentation::infrastructure::json_lines_sink::JsonLinesSink;
use liveliness_core::presentation::infrastructure::log_presentation_sink::LogPresentationSink;
use liveliness_core::presentation::infrastructure::overlay_image_sink::OverlayImageSink;
use liveliness_core::session::detection_loop::LoopPhase;
use liveliness_core::session::liveliness_session::LivelinessSession;
use liveliness_core::session::session_config::SessionConfig;
use liveliness_core::shared::constants::BLAZEFACE_MODEL_NAME;
use liveliness_core::shared::model_resolver::{self, ModelLocation};

#[cfg(target_os = "macos")]
const DEFAULT_DEVICE: &str = "0";
#[cfg(target_os = "windows")]
const DEFAULT_DEVICE: &str = "video=Integrated Camera";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const DEFAULT_DEVICE: &str = "/dev/video0";

/// How often the main thread checks whether the session died on its own.
const WATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Real-time face liveliness detection from a camera or an image sequence.
#[derive(Parser)]
#[command(name = "liveliness")]
struct Cli {
    /// Capture device (e.g. /dev/video0). Defaults to the platform's first camera.
    #[arg(long, conflicts_with = "images")]
    device: Option<String>,

    /// Replay a directory of images instead of opening a camera.
    #[arg(long)]
    images: Option<PathBuf>,

    /// BlazeFace ONNX model file. Looked up in the cache when omitted.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Where to download the model from when it is not cached.
    #[arg(long)]
    model_url: Option<String>,

    /// JSON session config. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Eye-line asymmetry cutoff in pixels.
    #[arg(long)]
    eye_threshold: Option<f32>,

    /// Mouth-to-nose offset cutoff in pixels.
    #[arg(long)]
    mouth_threshold: Option<f32>,

    /// How several faces in one frame combine: last-wins, all-lively, any-lively.
    #[arg(long)]
    aggregation: Option<AggregationPolicy>,

    /// Detection cadence in milliseconds.
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Give up on a single inference after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f32>,

    /// Save landmark overlays as PNG files to this directory.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,

    /// Save one overlay every N frames.
    #[arg(long, default_value = "30")]
    overlay_every: usize,

    /// Print one JSON object per processed frame to stdout.
    #[arg(long)]
    json: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    duration_secs: Option<u64>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;
    let config = build_config(&cli)?;

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl-C, stopping");
        let _ = stop_tx.try_send(());
    })?;

    let confidence = config.confidence;
    let fallback_size = config.default_size();
    let sink = build_sink(&cli)?;

    let mut session = LivelinessSession::new(config)?;
    session.start(
        || {
            let model_path = resolve_model(&cli)?;
            let detector = OnnxBlazefaceDetector::new(&model_path, confidence)?;
            Ok(Box::new(detector) as Box<dyn FaceDetector>)
        },
        || open_source(&cli, fallback_size),
        sink,
    )?;

    let deadline = cli
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    wait_for_shutdown(&session, &stop_rx, deadline);
    session.stop();

    println!("Liveliness: {}", session.status());
    match session.last_error() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Blocks until Ctrl-C, the deadline, or the session failing on its own.
fn wait_for_shutdown(
    session: &LivelinessSession,
    stop_rx: &Receiver<()>,
    deadline: Option<Instant>,
) {
    let watch = crossbeam_channel::tick(WATCH_INTERVAL);
    let timeout = match deadline {
        Some(at) => crossbeam_channel::at(at),
        None => crossbeam_channel::never(),
    };

    loop {
        select! {
            recv(stop_rx) -> _ => return,
            recv(timeout) -> _ => {
                log::info!("Duration elapsed, stopping");
                return;
            }
            recv(watch) -> _ => {
                if session.phase() == LoopPhase::Failed {
                    return;
                }
            }
        }
    }
}

fn build_config(cli: &Cli) -> Result<SessionConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    if let Some(eye) = cli.eye_threshold {
        config.thresholds.eye = eye;
    }
    if let Some(mouth) = cli.mouth_threshold {
        config.thresholds.mouth = mouth;
    }
    if let Some(aggregation) = cli.aggregation {
        config.aggregation = aggregation;
    }
    if let Some(ms) = cli.tick_ms {
        config.tick_interval_ms = ms;
    }
    if let Some(ms) = cli.timeout_ms {
        config.inference_timeout_ms = ms;
    }
    if let Some(confidence) = cli.confidence {
        config.confidence = confidence;
    }

    config.validate()?;
    Ok(config)
}

fn resolve_model(cli: &Cli) -> Result<PathBuf, ModelLoadError> {
    log::info!("Resolving model: {BLAZEFACE_MODEL_NAME}");
    let bundled_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("models")));

    let location = ModelLocation {
        name: BLAZEFACE_MODEL_NAME,
        explicit_path: cli.model.as_deref(),
        bundled_dir: bundled_dir.as_deref(),
        url: cli.model_url.as_deref(),
    };
    let path = model_resolver::resolve(&location, Some(Box::new(download_progress)))?;
    if cli.model_url.is_some() {
        eprintln!();
    }
    Ok(path)
}

fn open_source(
    cli: &Cli,
    fallback_size: (u32, u32),
) -> Result<Box<dyn FrameSource>, AcquisitionError> {
    if let Some(dir) = &cli.images {
        return Ok(Box::new(ImageSequenceSource::open(dir)?));
    }
    let device = cli.device.as_deref().unwrap_or(DEFAULT_DEVICE);
    let camera = FfmpegCameraSource::open(CameraSettings {
        device: device.to_string(),
        fallback_size,
    })?;
    Ok(Box::new(camera))
}

fn build_sink(cli: &Cli) -> Result<Box<dyn PresentationSink>, Box<dyn std::error::Error>> {
    let mut sinks: Vec<Box<dyn PresentationSink>> = vec![Box::new(LogPresentationSink::new())];
    if let Some(dir) = &cli.overlay_dir {
        sinks.push(Box::new(OverlayImageSink::new(dir, cli.overlay_every)?));
        log::info!(
            "Saving an overlay every {} frames to {}",
            cli.overlay_every,
            dir.display()
        );
    }
    if cli.json {
        sinks.push(Box::new(JsonLinesSink::new(std::io::stdout())));
    }
    Ok(Box::new(FanoutPresentationSink::new(sinks)))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(model) = &cli.model {
        if !model.exists() {
            return Err(format!("Model file not found: {}", model.display()).into());
        }
    }
    if let Some(dir) = &cli.images {
        if !dir.is_dir() {
            return Err(format!("Image directory not found: {}", dir.display()).into());
        }
    }
    if cli.overlay_every == 0 {
        return Err("--overlay-every must be at least 1".into());
    }
    if cli.duration_secs == Some(0) {
        return Err("--duration-secs must be at least 1".into());
    }
    if let Some(c) = cli.confidence {
        if !(0.0..=1.0).contains(&c) {
            return Err(format!("Confidence must be between 0.0 and 1.0, got {c}").into());
        }
    }
    Ok(())
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("liveliness").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "--eye-threshold",
            "3.5",
            "--aggregation",
            "any-lively",
            "--tick-ms",
            "33",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.thresholds.eye, 3.5);
        assert_eq!(config.thresholds.mouth, 5.0);
        assert_eq!(config.aggregation, AggregationPolicy::AnyLively);
        assert_eq!(config.tick_interval_ms, 33);
    }

    #[test]
    fn test_unknown_aggregation_is_rejected() {
        let result = Cli::try_parse_from(["liveliness", "--aggregation", "majority"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_device_and_images_conflict() {
        let result =
            Cli::try_parse_from(["liveliness", "--device", "/dev/video1", "--images", "frames"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let cli = parse(&["--tick-ms", "0"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_confidence() {
        let cli = parse(&["--confidence", "1.5"]);
        assert!(validate(&cli).is_err());
    }

    #[test]
    fn test_explicit_model_path_resolves_as_given() {
        let cli = parse(&["--model", "/opt/models/face.onnx"]);
        assert_eq!(
            resolve_model(&cli).unwrap(),
            PathBuf::from("/opt/models/face.onnx")
        );
    }

    #[test]
    fn test_validate_rejects_missing_image_dir() {
        let cli = parse(&["--images", "/nonexistent/frames"]);
        assert!(validate(&cli).is_err());
    }
}
