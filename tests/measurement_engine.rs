//! End-to-end behavior of the calibration and measurement engines over an
//! injected detector.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use measurement_kernel::{
    BoundingBox, CalibrationEngine, CalibrationError, CalibrationState, Detection,
    DetectorBackend, Frame, MeasurementEngine, MeasurementError, MeasurementMode,
    MeasurementResult, StubBackend,
};

struct FailingBackend;

impl DetectorBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>> {
        Err(anyhow!("tensor shape mismatch"))
    }
}

fn frame() -> Frame {
    Frame::blank(640, 480).expect("blank frame")
}

fn det(bounds: [f64; 4], confidence: f32) -> Detection {
    Detection::new(BoundingBox::from(bounds), confidence, 0)
}

fn engines(detections: Vec<Detection>) -> (CalibrationEngine, MeasurementEngine) {
    let detector: Arc<dyn DetectorBackend> = Arc::new(StubBackend::new(detections));
    (
        CalibrationEngine::new(detector.clone()),
        MeasurementEngine::new(detector),
    )
}

#[test]
fn calibrate_then_measure_same_reference() {
    let (calibration, measurement) = engines(vec![det([0.0, 0.0, 377.9, 100.0], 0.9)]);

    let state = calibration.calibrate(&frame(), 10.0).unwrap();
    assert_eq!(state.scale(), 37.79);
    assert_eq!(state.reference_size(), Some(10.0));

    let result = measurement.measure(&frame(), "single", &state).unwrap();
    assert_eq!(
        result,
        MeasurementResult::Single {
            width: 10.0,
            height: 2.65
        }
    );
}

#[test]
fn default_scale_single_scenario() {
    let (_, measurement) = engines(vec![det([100.0, 100.0, 300.0, 250.0], 0.9)]);
    let result = measurement
        .measure(&frame(), "single", &CalibrationState::uncalibrated())
        .unwrap();
    assert_eq!(
        result,
        MeasurementResult::Single {
            width: 5.29,
            height: 3.97
        }
    );
}

#[test]
fn angle_scenario_between_centers() {
    let (_, measurement) = engines(vec![
        det([80.0, 80.0, 120.0, 120.0], 0.9),
        det([180.0, 90.0, 220.0, 110.0], 0.8),
    ]);
    let result = measurement
        .measure(&frame(), "angle", &CalibrationState::default())
        .unwrap();
    assert_eq!(result, MeasurementResult::Angle { angle_degrees: 0.0 });
}

#[test]
fn scale_decreases_as_reference_size_grows() {
    let (calibration, _) = engines(vec![det([10.0, 10.0, 410.0, 90.0], 0.8)]);
    let sizes = [0.5, 1.0, 2.5, 10.0, 42.0, 1000.0];

    let scales: Vec<f64> = sizes
        .iter()
        .map(|&size| calibration.calibrate(&frame(), size).unwrap().scale())
        .collect();

    assert!(scales.iter().all(|&s| s > 0.0));
    assert!(scales.windows(2).all(|pair| pair[0] > pair[1]));
}

#[test]
fn single_width_is_rounded_pixel_width_over_scale() {
    for pixel_width in [1.0, 17.0, 199.5, 377.9, 640.0] {
        for scale in [0.75, 3.0, 37.79, 96.0] {
            let (_, measurement) = engines(vec![det([0.0, 0.0, pixel_width, 10.0], 0.95)]);
            let state = CalibrationState::new(scale, 1.0).unwrap();
            match measurement.measure(&frame(), "single", &state).unwrap() {
                MeasurementResult::Single { width, .. } => {
                    let expected = (pixel_width / scale * 100.0).round() / 100.0;
                    assert_eq!(width, expected, "P={pixel_width} S={scale}");
                }
                other => panic!("unexpected result {other:?}"),
            }
        }
    }
}

#[test]
fn nothing_above_threshold_is_an_error_everywhere() {
    let weak = vec![
        det([0.0, 0.0, 50.0, 50.0], 0.5),
        det([60.0, 0.0, 90.0, 50.0], 0.1),
    ];
    let (calibration, measurement) = engines(weak);
    let state = CalibrationState::default();

    assert!(matches!(
        calibration.calibrate(&frame(), 10.0),
        Err(CalibrationError::NoReferenceDetected)
    ));
    for mode in MeasurementMode::ALL {
        assert!(matches!(
            measurement.measure(&frame(), mode.as_str(), &state),
            Err(MeasurementError::NoObjectDetected)
        ));
    }
}

#[test]
fn angle_is_always_within_a_full_turn() {
    let offsets = [-300.0, -17.5, -1.0, 0.0, 0.25, 1.0, 64.0, 300.0];
    for dx in offsets {
        for dy in offsets {
            if dx == 0.0 && dy == 0.0 {
                continue;
            }
            let (_, measurement) = engines(vec![
                det([300.0, 200.0, 340.0, 240.0], 0.9),
                det([300.0 + dx, 200.0 + dy, 340.0 + dx, 240.0 + dy], 0.7),
            ]);
            match measurement
                .measure(&frame(), "angle", &CalibrationState::default())
                .unwrap()
            {
                MeasurementResult::Angle { angle_degrees } => {
                    assert!(
                        (0.0..360.0).contains(&angle_degrees),
                        "dx={dx} dy={dy} -> {angle_degrees}"
                    );
                }
                other => panic!("unexpected result {other:?}"),
            }
        }
    }
}

#[test]
fn unknown_mode_is_rejected_before_detection() {
    let state = CalibrationState::default();
    let (_, measurement) = engines(vec![det([0.0, 0.0, 10.0, 10.0], 0.9)]);
    let failing = MeasurementEngine::new(Arc::new(FailingBackend));

    for engine in [&measurement, &failing] {
        for mode in ["banana", "", "SINGLE", "areas"] {
            assert!(matches!(
                engine.measure(&frame(), mode, &state),
                Err(MeasurementError::UnknownMode(name)) if name == mode
            ));
        }
    }
}

#[test]
fn detector_failure_is_invalid_image() {
    let detector: Arc<dyn DetectorBackend> = Arc::new(FailingBackend);
    let calibration = CalibrationEngine::new(detector.clone());
    let measurement = MeasurementEngine::new(detector);

    match calibration.calibrate(&frame(), 5.0) {
        Err(CalibrationError::InvalidImage(msg)) => assert!(msg.contains("tensor shape")),
        other => panic!("unexpected result {other:?}"),
    }
    assert!(matches!(
        measurement.measure(&frame(), "area", &CalibrationState::default()),
        Err(MeasurementError::InvalidImage(_))
    ));
}

#[test]
fn invalid_reference_size_is_checked_before_detection() {
    let calibration = CalibrationEngine::new(Arc::new(FailingBackend));
    for size in [0.0, -10.0, f64::NAN, f64::NEG_INFINITY] {
        assert!(matches!(
            calibration.calibrate(&frame(), size),
            Err(CalibrationError::InvalidReferenceSize(_))
        ));
    }
}

#[test]
fn engines_share_one_detector_across_threads() {
    let (calibration, measurement) = engines(vec![
        det([0.0, 0.0, 200.0, 100.0], 0.9),
        det([300.0, 0.0, 400.0, 100.0], 0.8),
    ]);
    let frame = frame();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (1..=8)
            .map(|i| {
                let calibration = &calibration;
                let measurement = &measurement;
                let frame = &frame;
                scope.spawn(move || {
                    let state = calibration.calibrate(frame, i as f64).unwrap();
                    let result = measurement
                        .measure_mode(frame, MeasurementMode::Single, &state)
                        .unwrap();
                    (state.scale(), result)
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let k = (i + 1) as f64;
            let (scale, result) = handle.join().unwrap();
            assert_eq!(scale, 200.0 / k);
            assert_eq!(
                result,
                MeasurementResult::Single {
                    width: k,
                    height: (k * 50.0).round() / 100.0
                }
            );
        }
    });
}
