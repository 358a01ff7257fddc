//! Turning external payloads into `Frame`s.
//!
//! - `decode`: JPEG/PNG bytes and base64 data URLs (feature `decode`)
//! - `normalize`: pixel format conversion to RGB24
//!
//! Nothing in this module runs detection or touches calibration state.

#[cfg(feature = "decode")]
pub mod decode;
pub(crate) mod normalize;

#[cfg(feature = "decode")]
pub use decode::MAX_ENCODED_BYTES;
