use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Object detector capability consumed by the calibration and measurement engines.
///
/// A backend is built once by the caller (model loading is expensive) and shared
/// between engines behind an `Arc`. `detect` takes `&self` so concurrent requests
/// can run against the same instance; backends that hold mutable inference state
/// must synchronize internally.
///
/// Implementations must:
/// - Treat the frame as read-only
/// - Return boxes in the pixel space of the frame they were given
/// - Return detections ordered by descending confidence
///
/// Any device or model handles are released when the backend is dropped.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
