pub const BLAZEFACE_MODEL_NAME: &str = "blazeface.onnx";

/// Capture size used when the device does not report one.
pub const DEFAULT_FRAME_WIDTH: u32 = 640;
pub const DEFAULT_FRAME_HEIGHT: u32 = 480;

/// Vertical eye-line asymmetry cutoff, in pixels.
pub const DEFAULT_EYE_THRESHOLD: f32 = 5.0;
/// Vertical mouth-to-nose offset cutoff, in pixels.
pub const DEFAULT_MOUTH_THRESHOLD: f32 = 5.0;

/// Roughly one display refresh at 60 Hz.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 16;
pub const DEFAULT_INFERENCE_TIMEOUT_MS: u64 = 2000;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
