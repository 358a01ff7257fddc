#![cfg(feature = "decode")]

//! Encoded image payloads to `Frame`.
//!
//! Browser clients capture frames with `canvas.toDataURL("image/jpeg")`, so both a
//! full `data:image/...;base64,` URL and a bare base64 body are accepted.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::frame::{Frame, FrameError};

/// Upper bound on accepted encoded payloads.
pub const MAX_ENCODED_BYTES: usize = 16 * 1024 * 1024;

impl Frame {
    /// Decode a JPEG or PNG payload into an RGB24 frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.is_empty() {
            return Err(FrameError::Decode("empty payload".to_string()));
        }
        if bytes.len() > MAX_ENCODED_BYTES {
            return Err(FrameError::Decode(format!(
                "payload of {} bytes exceeds limit of {}",
                bytes.len(),
                MAX_ENCODED_BYTES
            )));
        }
        let image =
            image::load_from_memory(bytes).map_err(|e| FrameError::Decode(e.to_string()))?;
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        Frame::from_rgb(rgb.into_raw(), width, height)
    }

    /// Decode a base64 data URL (or bare base64 body) into an RGB24 frame.
    pub fn decode_data_url(data_url: &str) -> Result<Self, FrameError> {
        let payload = data_url_payload(data_url.trim())?;
        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| FrameError::DataUrl(format!("invalid base64: {}", e)))?;
        Frame::decode(&bytes)
    }
}

fn data_url_payload(data_url: &str) -> Result<&str, FrameError> {
    match data_url.split_once(',') {
        Some((header, body)) => {
            if !header.starts_with("data:") {
                return Err(FrameError::DataUrl(
                    "missing 'data:' scheme before payload".to_string(),
                ));
            }
            if !header.ends_with(";base64") {
                return Err(FrameError::DataUrl(
                    "only base64 data URLs are supported".to_string(),
                ));
            }
            Ok(body)
        }
        None if data_url.starts_with("data:") => {
            Err(FrameError::DataUrl("data URL has no payload".to_string()))
        }
        None => Ok(data_url),
    }
}
