use crate::frame::{FrameError, PixelFormat};

/// Convert a buffer in any supported format to interleaved RGB24.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>, FrameError> {
    let expected = format
        .expected_len(width, height)
        .ok_or(FrameError::DimensionsOverflow { width, height })?;
    if pixels.len() != expected {
        return Err(FrameError::LengthMismatch {
            format,
            expected,
            actual: pixels.len(),
        });
    }

    match format {
        PixelFormat::Rgb24 => Ok(pixels.to_vec()),
        PixelFormat::Gray8 => Ok(gray_to_rgb(pixels)),
    }
}

fn gray_to_rgb(luma: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(luma.len() * 3);
    for &y in luma {
        rgb.extend_from_slice(&[y, y, y]);
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_replicates_luma_into_every_channel() -> Result<(), FrameError> {
        let rgb = normalize_to_rgb(&[0, 77, 255], 3, 1, PixelFormat::Gray8)?;
        assert_eq!(rgb, vec![0, 0, 0, 77, 77, 77, 255, 255, 255]);
        Ok(())
    }

    #[test]
    fn rgb_pass_through_validates_length() -> Result<(), FrameError> {
        let pixels = vec![1u8; 9];
        let rgb = normalize_to_rgb(&pixels, 1, 3, PixelFormat::Rgb24)?;
        assert_eq!(rgb, pixels);

        assert!(matches!(
            normalize_to_rgb(&pixels, 2, 3, PixelFormat::Rgb24),
            Err(FrameError::LengthMismatch { expected: 18, .. })
        ));
        assert!(normalize_to_rgb(&[1, 2], 3, 1, PixelFormat::Gray8).is_err());
        Ok(())
    }
}
