use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::infrastructure::onnx_blazeface_detector::DEFAULT_CONFIDENCE;
use crate::liveliness::domain::aggregation_policy::AggregationPolicy;
use crate::liveliness::domain::liveliness_classifier::LivelinessThresholds;
use crate::shared::constants::{
    DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH, DEFAULT_INFERENCE_TIMEOUT_MS,
    DEFAULT_TICK_INTERVAL_MS,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything a session needs that is fixed for its lifetime.
///
/// Missing fields in a config file fall back to their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub thresholds: LivelinessThresholds,
    pub aggregation: AggregationPolicy,
    pub tick_interval_ms: u64,
    pub inference_timeout_ms: u64,
    /// Capture size for cameras that report none.
    pub default_width: u32,
    pub default_height: u32,
    pub confidence: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            thresholds: LivelinessThresholds::default(),
            aggregation: AggregationPolicy::default(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            inference_timeout_ms: DEFAULT_INFERENCE_TIMEOUT_MS,
            default_width: DEFAULT_FRAME_WIDTH,
            default_height: DEFAULT_FRAME_HEIGHT,
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

impl SessionConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be positive".into()));
        }
        if self.inference_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "inference_timeout_ms must be positive".into(),
            ));
        }
        if self.default_width == 0 || self.default_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "default size must be positive, got {}x{}",
                self.default_width, self.default_height
            )));
        }
        for (name, value) in [
            ("thresholds.eye", self.thresholds.eye),
            ("thresholds.mouth", self.thresholds.mouth),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ConfigError::Invalid(format!(
                "confidence must be between 0 and 1, got {}",
                self.confidence
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn default_size(&self) -> (u32, u32) {
        (self.default_width, self.default_height)
    }
}
