//! Pipeline configuration.
//!
//! All fields have defaults matching the handset the calibration ratios were
//! measured on, so an empty YAML document is a valid configuration.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::MeasureError;

/// Physical side length of the printed markers, in millimetres.
pub const DEFAULT_MARKER_LENGTH_MM: f64 = 50.0;

/// ArUco dictionary the markers are printed from.
pub const DEFAULT_DICTIONARY: &str = "DICT_6X6_50";

/// How marker detection is scheduled relative to frame arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionPolicy {
    /// Detect inline on the ingestion path; the renderer is only notified
    /// once the measurement state matches the new frame.
    Synchronous,
    /// Detect on a single background worker with a depth-1, discard-oldest queue.
    Asynchronous,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self::Synchronous
    }
}

/// Fixed ratios that derive pinhole intrinsics from the frame resolution.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct IntrinsicRatios {
    /// fx / width
    pub fx: f64,
    /// fy / height
    pub fy: f64,
    /// cx / width
    pub cx: f64,
    /// cy / height
    pub cy: f64,
}

impl Default for IntrinsicRatios {
    fn default() -> Self {
        Self {
            fx: 0.67352064836,
            fy: 1.19671093141,
            cx: 0.49904564092,
            cy: 0.49937073486,
        }
    }
}

/// Top-level configuration for the measurement system.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    /// Marker side length (mm). Distances are reported in the same unit.
    pub marker_length_mm: f64,

    /// Synchronous or asynchronous detection.
    pub policy: DetectionPolicy,

    /// Calibration ratios for the camera intrinsics.
    pub intrinsics: IntrinsicRatios,

    /// Marker dictionary name handed to the detector backend.
    pub dictionary: String,

    /// Smallest |n·d| accepted when intersecting a viewing ray with a marker plane.
    pub degenerate_epsilon: f64,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            marker_length_mm: DEFAULT_MARKER_LENGTH_MM,
            policy: DetectionPolicy::default(),
            intrinsics: IntrinsicRatios::default(),
            dictionary: DEFAULT_DICTIONARY.to_string(),
            degenerate_epsilon: 1e-6,
        }
    }
}

impl MeasureConfig {
    /// Load and validate a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let config: MeasureConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: MeasureConfig = serde_yaml::from_str(yaml).context("parsing config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MeasureError> {
        validate_marker_length(self.marker_length_mm)?;
        if !(self.degenerate_epsilon.is_finite() && self.degenerate_epsilon > 0.0) {
            return Err(MeasureError::InvalidDegenerateEpsilon(self.degenerate_epsilon));
        }
        Ok(())
    }
}

/// Marker length must be a positive, finite number.
pub fn validate_marker_length(length: f64) -> Result<(), MeasureError> {
    if length.is_finite() && length > 0.0 {
        Ok(())
    } else {
        Err(MeasureError::InvalidMarkerLength(length))
    }
}
