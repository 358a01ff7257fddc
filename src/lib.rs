//! Measurement Kernel
//!
//! This crate turns camera frames and detected bounding boxes into physical
//! measurements, using a scale derived from a reference object of known size.
//!
//! # Architecture
//!
//! Two engines share one injected detector:
//!
//! 1. **CalibrationEngine**: reference capture + known size -> `CalibrationState`
//!    (pixels per unit, measured along the image width).
//! 2. **MeasurementEngine**: frame + mode + `CalibrationState` -> `MeasurementResult`
//!    (`single`, `multiple`, `area`, `volume`, `angle`).
//!
//! Neither engine keeps state between calls. The caller owns the calibration and
//! threads it through every measurement; a session that never calibrated uses
//! `CalibrationState::uncalibrated()` (37.79 px/unit).
//!
//! # Module Structure
//!
//! - `frame`: validated decoded bitmaps
//! - `ingest`: JPEG/PNG/data-URL decoding and pixel format conversion
//! - `detect`: detector backend trait, stub and ONNX backends, registry
//! - `selection`: confidence threshold and tie-break policy
//! - `geometry`: boxes, rounding, angles
//! - `calibration`, `measurement`: the two engines
//! - `config`: TOML + env configuration for the `measure` binary
//!
//! ```
//! use std::sync::Arc;
//! use measurement_kernel::{
//!     BoundingBox, CalibrationEngine, Detection, Frame, MeasurementEngine, MeasurementResult,
//!     StubBackend,
//! };
//!
//! let detector = Arc::new(StubBackend::new(vec![Detection::new(
//!     BoundingBox::new(0.0, 0.0, 377.9, 200.0),
//!     0.9,
//!     0,
//! )]));
//! let frame = Frame::blank(640, 480).unwrap();
//!
//! let calibration = CalibrationEngine::new(detector.clone())
//!     .calibrate(&frame, 10.0)
//!     .unwrap();
//! assert_eq!(calibration.scale(), 37.79);
//!
//! let result = MeasurementEngine::new(detector)
//!     .measure(&frame, "single", &calibration)
//!     .unwrap();
//! assert_eq!(result, MeasurementResult::Single { width: 10.0, height: 5.29 });
//! ```

pub mod calibration;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod measurement;
pub mod selection;

pub use calibration::{
    calibrate_from_detections, CalibrationEngine, CalibrationError, CalibrationState,
    CalibrationStateError, DEFAULT_PIXELS_PER_UNIT,
};
pub use config::{DetectorSettings, MeasureConfig};
pub use detect::{BackendRegistry, Detection, DetectorBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use detect::{TractBackend, TractOptions};
pub use frame::{Frame, FrameError, PixelFormat};
pub use geometry::BoundingBox;
pub use measurement::{
    measure_detections, Dimensions, MeasurementEngine, MeasurementError, MeasurementMode,
    MeasurementResult,
};
pub use selection::CONFIDENCE_THRESHOLD;
