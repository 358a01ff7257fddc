//! Decoded frames handed to detector backends.
//!
//! A `Frame` is a validated bitmap: the pixel buffer length always matches
//! `width x height` for its `PixelFormat`. The engines never look at encoded
//! bytes; turning JPEG/PNG payloads into a `Frame` is the job of `crate::ingest`.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

use crate::ingest::normalize::normalize_to_rgb;

/// Pixel layouts accepted by `Frame::new`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Interleaved 8-bit RGB.
    Rgb24,
    /// Single 8-bit luma channel.
    Gray8,
}

impl PixelFormat {
    /// Expected buffer length for a `width x height` frame, `None` on overflow.
    pub fn expected_len(self, width: u32, height: u32) -> Option<usize> {
        let plane = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Rgb24 => plane.checked_mul(3),
            PixelFormat::Gray8 => Some(plane),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Gray8 => "gray8",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame has zero extent ({width}x{height})")]
    ZeroDimensions { width: u32, height: u32 },

    #[error("frame dimensions {width}x{height} overflow")]
    DimensionsOverflow { width: u32, height: u32 },

    #[error("{format} frame length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("malformed data URL: {0}")]
    DataUrl(String),
}

/// Decoded bitmap with known dimensions and pixel format.
///
/// Frames are read-only once constructed; detectors borrow them.
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl Frame {
    /// Wrap a pixel buffer, validating its length against the format.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimensions { width, height });
        }
        let expected = format
            .expected_len(width, height)
            .ok_or(FrameError::DimensionsOverflow { width, height })?;
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                format,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            format,
        })
    }

    /// Convenience constructor for RGB24 buffers.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        Self::new(data, width, height, PixelFormat::Rgb24)
    }

    /// Uniform black RGB frame. Useful when detections come from a scripted backend.
    pub fn blank(width: u32, height: u32) -> Result<Self, FrameError> {
        let len = PixelFormat::Rgb24
            .expected_len(width, height)
            .ok_or(FrameError::DimensionsOverflow { width, height })?;
        Self::from_rgb(vec![0u8; len], width, height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Pixels as interleaved RGB24, converting if the frame is stored in another format.
    pub fn to_rgb(&self) -> Result<Cow<'_, [u8]>, FrameError> {
        match self.format {
            PixelFormat::Rgb24 => Ok(Cow::Borrowed(&self.data)),
            other => normalize_to_rgb(&self.data, self.width, self.height, other).map(Cow::Owned),
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}
