#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::tract_ndarray::{ArrayView2, ArrayViewD, Axis, Ix2};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::postprocess::non_max_suppression;
use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::geometry::BoundingBox;

/// Tuning knobs for `TractBackend`.
#[derive(Clone, Debug)]
pub struct TractOptions {
    /// Model input width in pixels.
    pub input_width: u32,
    /// Model input height in pixels.
    pub input_height: u32,
    /// Scores below this are dropped before NMS.
    pub candidate_threshold: f32,
    /// IoU above which same-class boxes are suppressed.
    pub nms_iou: f64,
    /// Hard cap on returned detections.
    pub max_detections: usize,
}

impl Default for TractOptions {
    fn default() -> Self {
        Self {
            input_width: 640,
            input_height: 640,
            candidate_threshold: 0.25,
            nms_iou: 0.45,
            max_detections: 300,
        }
    }
}

/// Tract-based backend for YOLOv5-style ONNX detectors.
///
/// The model is loaded and optimized once in `new`; `detect` only runs the plan.
/// Expected output is `[1, N, 5 + C]` rows of `cx, cy, w, h, objectness, class scores`
/// in model-input pixels.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    options: TractOptions,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, options: TractOptions) -> Result<Self> {
        let model_path = model_path.as_ref();
        if options.input_width == 0 || options.input_height == 0 {
            bail!("model input size must be non-zero");
        }
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(
                        1,
                        3,
                        options.input_height as usize,
                        options.input_width as usize
                    ),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "loaded ONNX detector from {} ({}x{} input)",
            model_path.display(),
            options.input_width,
            options.input_height
        );

        Ok(Self { model, options })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let rgb = frame.to_rgb().context("frame is not convertible to RGB")?;
        let image = RgbImage::from_raw(frame.width(), frame.height(), rgb.into_owned())
            .ok_or_else(|| anyhow!("RGB buffer does not match frame dimensions"))?;
        let resized = imageops::resize(
            &image,
            self.options.input_width,
            self.options.input_height,
            FilterType::Triangle,
        );

        let width = self.options.input_width as usize;
        let height = self.options.input_height as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, height, width), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });

        Ok(input.into_tensor())
    }

    fn decode_output(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        decode_rows(
            output_rows(view)?,
            frame.width(),
            frame.height(),
            &self.options,
        )
    }
}

/// Strip the batch axis from a `[1, N, 5 + C]` output; `[N, 5 + C]` passes through.
fn output_rows(view: ArrayViewD<'_, f32>) -> Result<ArrayView2<'_, f32>> {
    let rows = match view.ndim() {
        3 => view.index_axis_move(Axis(0), 0),
        2 => view,
        n => bail!("unexpected detector output rank {}", n),
    };
    rows.into_dimensionality::<Ix2>()
        .context("detector output is not a row matrix")
}

/// Turn `cx, cy, w, h, objectness, class scores..` rows in model-input pixels
/// into frame-space detections, after thresholding, NMS and the detection cap.
fn decode_rows(
    rows: ArrayView2<'_, f32>,
    frame_width: u32,
    frame_height: u32,
    options: &TractOptions,
) -> Result<Vec<Detection>> {
    if rows.ncols() < 6 {
        bail!(
            "detector output rows need at least 6 columns, got {}",
            rows.ncols()
        );
    }

    let sx = frame_width as f64 / options.input_width as f64;
    let sy = frame_height as f64 / options.input_height as f64;

    let mut candidates = Vec::new();
    for row in rows.rows() {
        let objectness = row[4];
        let (class_id, class_score) = row
            .iter()
            .skip(5)
            .copied()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |best, (i, s)| {
                if s > best.1 {
                    (i, s)
                } else {
                    best
                }
            });
        let score = objectness * class_score;
        if !score.is_finite() || score < options.candidate_threshold {
            continue;
        }

        let bbox = BoundingBox::from_center(
            row[0] as f64,
            row[1] as f64,
            row[2] as f64,
            row[3] as f64,
        )
        .scaled(sx, sy)
        .clamped(frame_width as f64, frame_height as f64);
        if !bbox.is_valid() {
            continue;
        }
        candidates.push(Detection::new(bbox, score.min(1.0), class_id as u32));
    }

    let mut kept = non_max_suppression(candidates, options.nms_iou);
    kept.truncate(options.max_detections);
    Ok(kept)
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode_output(outputs, frame)
    }

    fn warm_up(&self) -> Result<()> {
        let frame = Frame::blank(self.options.input_width, self.options.input_height)?;
        self.detect(&frame).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tract_onnx::prelude::tract_ndarray::{arr2, Array2, Array3};

    fn options(input: u32) -> TractOptions {
        TractOptions {
            input_width: input,
            input_height: input,
            ..Default::default()
        }
    }

    #[test]
    fn score_is_objectness_times_best_class() {
        // Two classes; class 1 wins with 0.9, objectness 0.8.
        let rows = arr2(&[[50.0f32, 50.0, 20.0, 10.0, 0.8, 0.3, 0.9]]);
        let dets = decode_rows(rows.view(), 100, 100, &options(100)).unwrap();

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert!((dets[0].confidence - 0.72).abs() < 1e-6);
        assert_eq!(dets[0].bbox.to_bounds(), [40.0, 45.0, 60.0, 55.0]);
    }

    #[test]
    fn rows_below_candidate_threshold_are_dropped() {
        let rows = arr2(&[
            // 0.9 * 0.2 = 0.18 < 0.25
            [50.0f32, 50.0, 20.0, 20.0, 0.9, 0.2],
            // 0.5 * 0.6 = 0.30
            [20.0, 20.0, 10.0, 10.0, 0.5, 0.6],
            [20.0, 20.0, 10.0, 10.0, f32::NAN, 0.6],
        ]);
        let dets = decode_rows(rows.view(), 100, 100, &options(100)).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox.center(), (20.0, 20.0));
    }

    #[test]
    fn boxes_are_rescaled_to_frame_and_clamped() {
        // Model input 320x320, frame 640x480: sx = 2, sy = 1.5.
        let rows = arr2(&[
            [160.0f32, 160.0, 100.0, 40.0, 1.0, 1.0],
            // Spills past the right edge of the model input.
            [310.0, 20.0, 40.0, 20.0, 1.0, 1.0],
        ]);
        let dets = decode_rows(rows.view(), 640, 480, &options(320)).unwrap();

        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].bbox.to_bounds(), [220.0, 210.0, 420.0, 270.0]);
        assert_eq!(dets[1].bbox.to_bounds(), [580.0, 15.0, 640.0, 45.0]);
    }

    #[test]
    fn same_class_overlaps_are_suppressed() {
        let rows = arr2(&[
            [50.0f32, 50.0, 20.0, 20.0, 0.7, 1.0, 0.0],
            [51.0, 50.0, 20.0, 20.0, 0.9, 1.0, 0.0],
            // Same place, other class.
            [50.0, 50.0, 20.0, 20.0, 0.8, 0.0, 1.0],
        ]);
        let dets = decode_rows(rows.view(), 100, 100, &options(100)).unwrap();

        let summary: Vec<(u32, f32)> = dets.iter().map(|d| (d.class_id, d.confidence)).collect();
        assert_eq!(summary, vec![(0, 0.9), (1, 0.8)]);
    }

    #[test]
    fn detection_cap_keeps_strongest() {
        let rows = Array2::from_shape_fn((10, 6), |(i, c)| match c {
            0 => 5.0 + 10.0 * i as f32,
            1 => 5.0,
            2 | 3 => 8.0,
            4 => 0.3 + 0.05 * i as f32,
            _ => 1.0,
        });
        let opts = TractOptions {
            max_detections: 3,
            ..options(100)
        };
        let dets = decode_rows(rows.view(), 100, 100, &opts).unwrap();

        assert_eq!(dets.len(), 3);
        let xs: Vec<f64> = dets.iter().map(|d| d.bbox.center().0).collect();
        assert_eq!(xs, vec![95.0, 85.0, 75.0]);
    }

    #[test]
    fn short_rows_are_rejected() {
        let rows = arr2(&[[50.0f32, 50.0, 20.0, 20.0, 0.9]]);
        let err = decode_rows(rows.view(), 100, 100, &options(100)).unwrap_err();
        assert!(err.to_string().contains("at least 6 columns"));
    }

    #[test]
    fn batch_axis_is_stripped() {
        let batched = Array3::<f32>::zeros((1, 4, 7)).into_dyn();
        assert_eq!(output_rows(batched.view()).unwrap().dim(), (4, 7));

        let flat = Array2::<f32>::zeros((4, 7)).into_dyn();
        assert_eq!(output_rows(flat.view()).unwrap().dim(), (4, 7));

        let scalar = tract_ndarray::Array1::<f32>::zeros(7).into_dyn();
        assert!(output_rows(scalar.view()).is_err());
    }
}
