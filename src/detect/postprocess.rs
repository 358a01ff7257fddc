//! Detector output cleanup shared by model backends.

use std::cmp::Ordering;

use crate::detect::result::Detection;

/// Stable sort by descending confidence; equal scores keep their input order.
pub fn sort_by_confidence(detections: &mut [Detection]) {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
}

/// Greedy per-class non-maximum suppression.
///
/// Returns the surviving detections ordered by descending confidence. A box is
/// dropped when it overlaps an already kept box of the same class with IoU above
/// `iou_threshold`.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f64) -> Vec<Detection> {
    sort_by_confidence(&mut detections);

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = keep.iter().any(|kept| {
            kept.class_id == candidate.class_id && kept.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}
