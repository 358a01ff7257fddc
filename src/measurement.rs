//! Bounding-box measurements in calibrated units.
//!
//! Every mode starts the same way: run the detector, keep detections above
//! `selection::CONFIDENCE_THRESHOLD`, then convert pixels to units with the
//! caller's `CalibrationState`. Outputs are rounded to two decimals.
//!
//! Area and volume are estimates. Area treats the bounding box as the object's
//! footprint; volume uses the box height as a stand-in for depth
//! (`width * height * height`).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibration::CalibrationState;
use crate::detect::{Detection, DetectorBackend};
use crate::frame::Frame;
use crate::geometry::{normalize_degrees, round2, vector_angle_degrees, BoundingBox};
use crate::selection::{self, Candidates};

/// Detections needed by `MeasurementMode::Angle`.
const ANGLE_DETECTIONS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementMode {
    Single,
    Multiple,
    Area,
    Volume,
    Angle,
}

impl MeasurementMode {
    pub const ALL: [MeasurementMode; 5] = [
        MeasurementMode::Single,
        MeasurementMode::Multiple,
        MeasurementMode::Area,
        MeasurementMode::Volume,
        MeasurementMode::Angle,
    ];

    /// Wire name, as accepted by `FromStr`.
    pub fn as_str(self) -> &'static str {
        match self {
            MeasurementMode::Single => "single",
            MeasurementMode::Multiple => "multiple",
            MeasurementMode::Area => "area",
            MeasurementMode::Volume => "volume",
            MeasurementMode::Angle => "angle",
        }
    }

    /// Human-readable label for menus.
    pub fn label(self) -> &'static str {
        match self {
            MeasurementMode::Single => "Single Object",
            MeasurementMode::Multiple => "Multiple Objects",
            MeasurementMode::Area => "Area Measurement",
            MeasurementMode::Volume => "Volume Estimation",
            MeasurementMode::Angle => "Angle Measurement",
        }
    }
}

impl fmt::Display for MeasurementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementMode {
    type Err = MeasurementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeasurementMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| MeasurementError::UnknownMode(s.to_string()))
    }
}

/// Width and height of one object, in calibration units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

/// Mode-tagged measurement output. All lengths are in calibration units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum MeasurementResult {
    Single { width: f64, height: f64 },
    Multiple { objects: Vec<Dimensions> },
    Area { area: f64 },
    Volume { volume: f64, height: f64 },
    /// Angle in `[0, 360)` degrees.
    Angle { angle_degrees: f64 },
}

impl MeasurementResult {
    pub fn mode(&self) -> MeasurementMode {
        match self {
            MeasurementResult::Single { .. } => MeasurementMode::Single,
            MeasurementResult::Multiple { .. } => MeasurementMode::Multiple,
            MeasurementResult::Area { .. } => MeasurementMode::Area,
            MeasurementResult::Volume { .. } => MeasurementMode::Volume,
            MeasurementResult::Angle { .. } => MeasurementMode::Angle,
        }
    }
}

#[derive(Debug, Error)]
pub enum MeasurementError {
    #[error("frame could not be consumed by the detector: {0}")]
    InvalidImage(String),

    #[error("no object detected above confidence {threshold}", threshold = selection::CONFIDENCE_THRESHOLD)]
    NoObjectDetected,

    #[error("mode needs {required} detected objects, found {found}")]
    InsufficientDetections { required: usize, found: usize },

    #[error("unknown measurement mode '{0}'")]
    UnknownMode(String),

    #[error("{mode} measurement does not fit in a finite number at this scale")]
    OutOfRange { mode: MeasurementMode },
}

/// Converts detections into measurements for a given calibration.
#[derive(Clone)]
pub struct MeasurementEngine {
    detector: Arc<dyn DetectorBackend>,
}

impl MeasurementEngine {
    pub fn new(detector: Arc<dyn DetectorBackend>) -> Self {
        Self { detector }
    }

    /// Measure `frame` in the mode named by `mode`.
    ///
    /// The mode is validated before the detector runs.
    pub fn measure(
        &self,
        frame: &Frame,
        mode: &str,
        calibration: &CalibrationState,
    ) -> Result<MeasurementResult, MeasurementError> {
        let mode = mode.parse::<MeasurementMode>()?;
        self.measure_mode(frame, mode, calibration)
    }

    pub fn measure_mode(
        &self,
        frame: &Frame,
        mode: MeasurementMode,
        calibration: &CalibrationState,
    ) -> Result<MeasurementResult, MeasurementError> {
        let detections = self.detector.detect(frame).map_err(|e| {
            log::warn!("detector '{}' failed during measurement: {:#}", self.detector.name(), e);
            MeasurementError::InvalidImage(format!("{:#}", e))
        })?;
        log::debug!(
            "{} measurement on {}x{} frame: {} detections from '{}'",
            mode,
            frame.width(),
            frame.height(),
            detections.len(),
            self.detector.name()
        );

        measure_detections(&detections, mode, calibration)
    }
}

/// Measurement policy applied to an already computed detection list.
pub fn measure_detections(
    detections: &[Detection],
    mode: MeasurementMode,
    calibration: &CalibrationState,
) -> Result<MeasurementResult, MeasurementError> {
    if calibration.is_default() {
        log::warn!(
            "measuring with default scale {} px/unit; calibrate for accurate results",
            calibration.scale()
        );
    }

    let candidates = Candidates::new(detections);
    if candidates.is_empty() {
        return Err(MeasurementError::NoObjectDetected);
    }
    let units = |value: f64| finite(mode, round2(value));

    let result = match mode {
        MeasurementMode::Single => {
            let d = dimensions(&best(&candidates)?.bbox, calibration);
            MeasurementResult::Single {
                width: units(d.width)?,
                height: units(d.height)?,
            }
        }
        MeasurementMode::Multiple => MeasurementResult::Multiple {
            objects: candidates
                .in_order()
                .iter()
                .map(|det| {
                    let d = dimensions(&det.bbox, calibration);
                    Ok(Dimensions {
                        width: units(d.width)?,
                        height: units(d.height)?,
                    })
                })
                .collect::<Result<_, MeasurementError>>()?,
        },
        MeasurementMode::Area => {
            let d = dimensions(&best(&candidates)?.bbox, calibration);
            MeasurementResult::Area {
                area: units(d.width * d.height)?,
            }
        }
        MeasurementMode::Volume => {
            let d = dimensions(&best(&candidates)?.bbox, calibration);
            MeasurementResult::Volume {
                volume: units(d.width * d.height * d.height)?,
                height: units(d.height)?,
            }
        }
        MeasurementMode::Angle => {
            let ranked = candidates.top(ANGLE_DETECTIONS);
            if ranked.len() < ANGLE_DETECTIONS {
                return Err(MeasurementError::InsufficientDetections {
                    required: ANGLE_DETECTIONS,
                    found: ranked.len(),
                });
            }
            let angle = vector_angle_degrees(ranked[0].bbox.center(), ranked[1].bbox.center());
            // Rounding can push 359.995.. up to 360.00.
            MeasurementResult::Angle {
                angle_degrees: normalize_degrees(units(angle)?),
            }
        }
    };

    Ok(result)
}

fn best<'a>(candidates: &Candidates<'a>) -> Result<&'a Detection, MeasurementError> {
    candidates.best().ok_or(MeasurementError::NoObjectDetected)
}

fn finite(mode: MeasurementMode, value: f64) -> Result<f64, MeasurementError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MeasurementError::OutOfRange { mode })
    }
}

fn dimensions(bbox: &BoundingBox, calibration: &CalibrationState) -> Dimensions {
    Dimensions {
        width: calibration.to_units(bbox.width()),
        height: calibration.to_units(bbox.height()),
    }
}
