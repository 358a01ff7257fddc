use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// One object found in a frame.
///
/// Coordinates are pixels in the frame the detector was run on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    /// Opaque category identifier, passed through untouched.
    #[serde(default)]
    pub class_id: u32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, class_id: u32) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
        }
    }

    /// True when the box is valid and the confidence lies in `[0, 1]`.
    pub fn is_well_formed(&self) -> bool {
        self.bbox.is_valid() && (0.0..=1.0).contains(&self.confidence)
    }
}
