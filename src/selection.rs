//! Detection selection policy shared by both engines.
//!
//! Only well-formed detections strictly above `CONFIDENCE_THRESHOLD` are
//! considered. When one detection has to be chosen, the highest confidence
//! wins and ties go to the detection the backend reported first.

use std::cmp::Ordering;

use crate::detect::Detection;

/// Minimum confidence (exclusive) for a detection to be used.
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Detections of one frame that passed the threshold, filtered exactly once.
#[derive(Debug)]
pub struct Candidates<'a> {
    accepted: Vec<&'a Detection>,
    discarded: usize,
}

impl<'a> Candidates<'a> {
    /// Filter a detector's output.
    ///
    /// Malformed detections (inverted or non-finite boxes, confidence outside
    /// `[0, 1]`) are dropped with a warning.
    pub fn new(detections: &'a [Detection]) -> Self {
        let mut accepted = Vec::with_capacity(detections.len());
        let mut discarded = 0;
        for d in detections {
            if !d.is_well_formed() {
                log::warn!(
                    "discarding malformed detection {:?} (confidence {})",
                    d.bbox.to_bounds(),
                    d.confidence
                );
                discarded += 1;
                continue;
            }
            if d.confidence > CONFIDENCE_THRESHOLD {
                accepted.push(d);
            }
        }
        Self {
            accepted,
            discarded,
        }
    }

    /// Accepted detections in the order the backend reported them.
    pub fn in_order(&self) -> &[&'a Detection] {
        &self.accepted
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    /// Malformed detections dropped while filtering.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Highest-confidence accepted detection; ties go to the earliest one.
    pub fn best(&self) -> Option<&'a Detection> {
        self.top(1).into_iter().next()
    }

    /// Up to `n` accepted detections ranked by descending confidence.
    ///
    /// The sort is stable, so equal confidences keep backend order.
    pub fn top(&self, n: usize) -> Vec<&'a Detection> {
        let mut ranked = self.accepted.clone();
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        ranked.truncate(n);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    fn det(x0: f64, confidence: f32) -> Detection {
        Detection::new(BoundingBox::new(x0, 0.0, x0 + 10.0, 10.0), confidence, 0)
    }

    fn xs(dets: &[&Detection]) -> Vec<f64> {
        dets.iter().map(|d| d.bbox.x_min).collect()
    }

    #[test]
    fn threshold_is_exclusive() {
        let dets = vec![det(0.0, 0.5), det(1.0, 0.51), det(2.0, 0.2)];
        let candidates = Candidates::new(&dets);
        assert_eq!(xs(candidates.in_order()), vec![1.0]);
        assert_eq!(candidates.discarded(), 0);
    }

    #[test]
    fn in_order_preserves_backend_order() {
        let dets = vec![det(0.0, 0.6), det(1.0, 0.9), det(2.0, 0.7)];
        assert_eq!(xs(Candidates::new(&dets).in_order()), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn best_breaks_ties_by_backend_order() {
        let dets = vec![det(0.0, 0.6), det(1.0, 0.8), det(2.0, 0.8)];
        assert_eq!(Candidates::new(&dets).best().unwrap().bbox.x_min, 1.0);
    }

    #[test]
    fn malformed_detections_are_counted_once() {
        let mut inverted = det(0.0, 0.99);
        inverted.bbox = BoundingBox::new(10.0, 0.0, 0.0, 10.0);
        let over_confident = det(1.0, 1.5);
        let nan = det(2.0, f32::NAN);
        let dets = vec![inverted, over_confident, nan, det(3.0, 0.7)];

        let candidates = Candidates::new(&dets);
        assert_eq!(candidates.discarded(), 3);

        // Ranking works on the filtered list and never revisits the input.
        assert_eq!(xs(candidates.in_order()), vec![3.0]);
        assert_eq!(candidates.best().unwrap().bbox.x_min, 3.0);
        assert_eq!(xs(&candidates.top(2)), vec![3.0]);
        assert_eq!(candidates.discarded(), 3);
    }

    #[test]
    fn top_ranks_and_truncates() {
        let dets = vec![det(0.0, 0.6), det(1.0, 0.9), det(2.0, 0.7)];
        let candidates = Candidates::new(&dets);
        assert_eq!(xs(&candidates.top(2)), vec![1.0, 2.0]);
        assert!(Candidates::new(&[]).top(2).is_empty());
        assert!(Candidates::new(&[]).is_empty());
    }
}
