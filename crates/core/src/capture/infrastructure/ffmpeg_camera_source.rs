use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::capture::domain::frame_source::{AcquisitionError, FrameSource};
use crate::shared::frame::Frame;

/// How long `open` waits for the device to answer.
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause before retrying a read the device asked us to repeat.
const RETRY_DELAY: Duration = Duration::from_millis(5);

#[cfg(target_os = "linux")]
const DEVICE_FORMAT: &str = "v4l2";
#[cfg(target_os = "macos")]
const DEVICE_FORMAT: &str = "avfoundation";
#[cfg(target_os = "windows")]
const DEVICE_FORMAT: &str = "dshow";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const DEVICE_FORMAT: &str = "v4l2";

/// Capture settings for [`FfmpegCameraSource`].
#[derive(Clone, Debug)]
pub struct CameraSettings {
    /// Device path or name, e.g. `/dev/video0` or `0` on macOS.
    pub device: String,
    /// Output size when the device does not report one.
    pub fallback_size: (u32, u32),
}

#[derive(Default)]
struct Slot {
    latest: Option<Frame>,
    error: Option<AcquisitionError>,
}

/// Live camera capture through libavdevice.
///
/// A capture thread decodes continuously and keeps only the newest frame,
/// so polling never blocks and never falls behind the device.
pub struct FfmpegCameraSource {
    slot: Arc<Mutex<Slot>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    width: u32,
    height: u32,
    device: String,
}

impl FfmpegCameraSource {
    /// Opens the device and starts capturing. Blocks until the device has
    /// either accepted or refused the stream.
    pub fn open(settings: CameraSettings) -> Result<Self, AcquisitionError> {
        let slot = Arc::new(Mutex::new(Slot::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let (opened_tx, opened_rx) = crossbeam_channel::bounded(1);

        let device = settings.device.clone();
        let thread_slot = slot.clone();
        let thread_stop = stop.clone();
        let handle = std::thread::Builder::new()
            .name("liveliness-capture".into())
            .spawn(move || capture_thread(settings, thread_slot, thread_stop, opened_tx))
            .map_err(|e| AcquisitionError::DeviceUnavailable {
                device: device.clone(),
                reason: e.to_string(),
            })?;

        let (width, height) = match opened_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(dims)) => dims,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                stop.store(true, Ordering::Relaxed);
                return Err(AcquisitionError::DeviceUnavailable {
                    device,
                    reason: format!("no response within {OPEN_TIMEOUT:?}"),
                });
            }
        };

        log::info!("Camera {device} opened at {width}x{height}");

        Ok(Self {
            slot,
            stop,
            handle: Some(handle),
            width,
            height,
            device,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FrameSource for FfmpegCameraSource {
    fn is_ready(&mut self) -> Result<bool, AcquisitionError> {
        let slot = self.lock();
        if let Some(e) = &slot.error {
            return Err(e.clone());
        }
        Ok(slot.latest.is_some())
    }

    /// Takes the newest frame, so each captured frame is handed out once.
    fn current_frame(&mut self) -> Result<Frame, AcquisitionError> {
        let mut slot = self.lock();
        if let Some(e) = &slot.error {
            return Err(e.clone());
        }
        slot.latest.take().ok_or(AcquisitionError::NotReady)
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Capture thread for {} panicked", self.device);
            }
        }
        let mut slot = self.lock();
        slot.latest = None;
        slot.error = Some(AcquisitionError::StreamEnded("source closed".into()));
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }
}

impl Drop for FfmpegCameraSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn capture_thread(
    settings: CameraSettings,
    slot: Arc<Mutex<Slot>>,
    stop: Arc<AtomicBool>,
    opened_tx: crossbeam_channel::Sender<Result<(u32, u32), AcquisitionError>>,
) {
    let unavailable = |reason: String| AcquisitionError::DeviceUnavailable {
        device: settings.device.clone(),
        reason,
    };

    let opened = open_device(&settings).map_err(|e| unavailable(e.to_string()));
    let mut capture = match opened {
        Ok(capture) => capture,
        Err(e) => {
            let _ = opened_tx.send(Err(e));
            return;
        }
    };
    let _ = opened_tx.send(Ok((capture.width, capture.height)));

    let Err(error) = capture.run(&settings.device, &slot, &stop) else {
        return;
    };
    log::error!("Capture from {} failed: {error}", settings.device);
    slot.lock().unwrap_or_else(|e| e.into_inner()).error = Some(error);
}

struct Capture {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
}

fn open_device(settings: &CameraSettings) -> Result<Capture, Box<dyn std::error::Error>> {
    ffmpeg_next::init()?;
    ffmpeg_next::device::register_all();

    let format = ffmpeg_next::device::input::video()
        .find(|f| f.name().split(',').any(|n| n == DEVICE_FORMAT))
        .ok_or_else(|| format!("input format {DEVICE_FORMAT} not available"))?;

    let ictx = ffmpeg_next::format::open_with(
        &settings.device,
        &format,
        ffmpeg_next::Dictionary::new(),
    )?
    .input();

    let stream = ictx
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or("No video stream found")?;
    let stream_index = stream.index();
    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
    let decoder = codec_ctx.decoder().video()?;

    let (width, height) =
        resolve_dimensions(decoder.width(), decoder.height(), settings.fallback_size);
    let scaler = ffmpeg_next::software::scaling::Context::get(
        decoder.format(),
        decoder.width().max(1),
        decoder.height().max(1),
        ffmpeg_next::format::Pixel::RGB24,
        width,
        height,
        ffmpeg_next::software::scaling::Flags::BILINEAR,
    )?;

    Ok(Capture {
        ictx,
        decoder,
        scaler,
        stream_index,
        width,
        height,
    })
}

#[derive(Debug, PartialEq)]
enum ReadOutcome {
    Retry,
    Fatal(AcquisitionError),
}

/// Sorts a failed packet read into "try again" and "the device is gone".
fn classify_read_error(error: ffmpeg_next::Error, device: &str) -> ReadOutcome {
    match error {
        ffmpeg_next::Error::Other { errno } if errno == ffmpeg_next::util::error::EAGAIN => {
            ReadOutcome::Retry
        }
        ffmpeg_next::Error::Eof => {
            ReadOutcome::Fatal(AcquisitionError::StreamEnded(format!("{device} stopped sending")))
        }
        other => ReadOutcome::Fatal(AcquisitionError::DeviceUnavailable {
            device: device.to_string(),
            reason: other.to_string(),
        }),
    }
}

impl Capture {
    /// Reads until `stop` is set (`Ok`) or the device fails (`Err`).
    fn run(
        &mut self,
        device: &str,
        slot: &Mutex<Slot>,
        stop: &AtomicBool,
    ) -> Result<(), AcquisitionError> {
        let mut index = 0usize;
        loop {
            if stop.load(Ordering::Relaxed) {
                return Ok(());
            }

            let mut packet = ffmpeg_next::Packet::empty();
            if let Err(e) = packet.read(&mut self.ictx) {
                match classify_read_error(e, device) {
                    ReadOutcome::Retry => {
                        std::thread::sleep(RETRY_DELAY);
                        continue;
                    }
                    ReadOutcome::Fatal(error) => return Err(error),
                }
            }
            if packet.stream() != self.stream_index {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
                self.scaler
                    .run(&decoded, &mut rgb)
                    .map_err(|e| AcquisitionError::Decode(e.to_string()))?;
                let pixels = extract_rgb_pixels(&rgb, self.width, self.height);
                let frame = Frame::new(pixels, self.width, self.height, 3, index);
                index += 1;
                slot.lock().unwrap_or_else(|e| e.into_inner()).latest = Some(frame);
            }
        }
    }
}

fn resolve_dimensions(width: u32, height: u32, fallback: (u32, u32)) -> (u32, u32) {
    if width == 0 || height == 0 {
        fallback
    } else {
        (width, height)
    }
}

fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
