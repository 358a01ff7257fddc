//! Pixel-to-unit calibration from a reference capture.
//!
//! The caller photographs an object of known size with that dimension aligned to
//! the image width. The best detection's pixel width divided by the known size
//! gives the scale in pixels per unit. Height and diagonal are never used.
//!
//! The engine keeps no state: the returned `CalibrationState` belongs to the
//! caller, who stores it and passes it back into every measurement.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detect::{Detection, DetectorBackend};
use crate::frame::Frame;
use crate::selection::{self, Candidates};

/// Scale used when no calibration has been performed (pixels per centimeter at 96 DPI).
pub const DEFAULT_PIXELS_PER_UNIT: f64 = 37.79;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("frame could not be consumed by the detector: {0}")]
    InvalidImage(String),

    #[error("reference size must be a positive normal number, got {0}")]
    InvalidReferenceSize(f64),

    #[error("no reference object detected above confidence {threshold}", threshold = selection::CONFIDENCE_THRESHOLD)]
    NoReferenceDetected,
}

/// Rejected attempts to build a `CalibrationState` directly.
#[derive(Debug, Error, PartialEq)]
pub enum CalibrationStateError {
    #[error("scale must be a positive normal number, got {0}")]
    InvalidScale(f64),

    #[error("reference size must be a positive normal number, got {0}")]
    InvalidReferenceSize(f64),
}

/// Pixel-to-unit scale, immutable once built.
///
/// `scale` is a positive normal float for every value of this type, including
/// deserialized ones, so `pixels / scale` stays finite for on-screen lengths.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CalibrationRecord", into = "CalibrationRecord")]
pub struct CalibrationState {
    scale: f64,
    reference_size: Option<f64>,
}

/// Serialized shape of `CalibrationState`; converting back validates it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_size: Option<f64>,
}

impl CalibrationState {
    /// Restore a previously computed calibration.
    pub fn new(scale: f64, reference_size: f64) -> Result<Self, CalibrationStateError> {
        if !is_positive(reference_size) {
            return Err(CalibrationStateError::InvalidReferenceSize(reference_size));
        }
        Self::with_scale(scale, Some(reference_size))
    }

    /// The documented fallback for sessions that never calibrated.
    ///
    /// Measurements made with it are usable but only as accurate as the 96 DPI
    /// assumption behind `DEFAULT_PIXELS_PER_UNIT`.
    pub fn uncalibrated() -> Self {
        Self {
            scale: DEFAULT_PIXELS_PER_UNIT,
            reference_size: None,
        }
    }

    fn with_scale(scale: f64, reference_size: Option<f64>) -> Result<Self, CalibrationStateError> {
        if !is_positive(scale) {
            return Err(CalibrationStateError::InvalidScale(scale));
        }
        Ok(Self {
            scale,
            reference_size,
        })
    }

    /// Pixels per physical unit.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Physical size of the reference object, `None` for the default scale.
    pub fn reference_size(&self) -> Option<f64> {
        self.reference_size
    }

    /// True when this is the built-in default rather than a measured calibration.
    pub fn is_default(&self) -> bool {
        self.reference_size.is_none()
    }

    /// Convert a pixel length to physical units (unrounded).
    pub fn to_units(&self, pixels: f64) -> f64 {
        pixels / self.scale
    }
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self::uncalibrated()
    }
}

impl TryFrom<CalibrationRecord> for CalibrationState {
    type Error = CalibrationStateError;

    fn try_from(record: CalibrationRecord) -> Result<Self, Self::Error> {
        match record.reference_size {
            Some(size) => Self::new(record.scale, size),
            None => Self::with_scale(record.scale, None),
        }
    }
}

impl From<CalibrationState> for CalibrationRecord {
    fn from(state: CalibrationState) -> Self {
        Self {
            scale: state.scale,
            reference_size: state.reference_size,
        }
    }
}

/// Derives `CalibrationState` values from reference captures.
#[derive(Clone)]
pub struct CalibrationEngine {
    detector: Arc<dyn DetectorBackend>,
}

impl CalibrationEngine {
    pub fn new(detector: Arc<dyn DetectorBackend>) -> Self {
        Self { detector }
    }

    /// Calibrate against a reference object of `reference_size` units.
    pub fn calibrate(
        &self,
        frame: &Frame,
        reference_size: f64,
    ) -> Result<CalibrationState, CalibrationError> {
        if !is_positive(reference_size) {
            return Err(CalibrationError::InvalidReferenceSize(reference_size));
        }

        let detections = self.detector.detect(frame).map_err(|e| {
            log::warn!("detector '{}' failed during calibration: {:#}", self.detector.name(), e);
            CalibrationError::InvalidImage(format!("{:#}", e))
        })?;
        log::debug!(
            "calibration frame {}x{}: {} detections from '{}'",
            frame.width(),
            frame.height(),
            detections.len(),
            self.detector.name()
        );

        calibrate_from_detections(&detections, reference_size)
    }
}

/// Calibration policy applied to an already computed detection list.
pub fn calibrate_from_detections(
    detections: &[Detection],
    reference_size: f64,
) -> Result<CalibrationState, CalibrationError> {
    if !is_positive(reference_size) {
        return Err(CalibrationError::InvalidReferenceSize(reference_size));
    }
    let candidates = Candidates::new(detections);
    let reference = candidates
        .best()
        .ok_or(CalibrationError::NoReferenceDetected)?;

    let pixel_width = reference.bbox.width();
    let state = CalibrationState::new(pixel_width / reference_size, reference_size)
        .map_err(|_| CalibrationError::InvalidReferenceSize(reference_size))?;

    log::info!(
        "calibrated {:.4} px/unit from {:.1} px reference of size {} (confidence {:.2})",
        state.scale(),
        pixel_width,
        reference_size,
        reference.confidence
    );
    Ok(state)
}

/// Finite, strictly positive and not subnormal.
fn is_positive(value: f64) -> bool {
    value.is_normal() && value > 0.0
}
