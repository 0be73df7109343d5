//! Frame decoding and pixel statistics

use image::RgbImage;

use super::FaceError;
use crate::classifier::FrameDecoder;

/// Decodes a single still image (PNG / JPEG) as a one-frame clip
#[derive(Debug, Clone, Copy, Default)]
pub struct StillImageDecoder;

impl FrameDecoder for StillImageDecoder {
    fn decode(&self, bytes: &[u8], max_frames: usize) -> Result<Vec<RgbImage>, FaceError> {
        if bytes.is_empty() {
            return Err(FaceError::Decode("Empty image data".to_string()));
        }
        if max_frames == 0 {
            return Ok(Vec::new());
        }
        let format = image::guess_format(bytes)
            .map_err(|_| FaceError::Unsupported("Unrecognised image format".to_string()))?;
        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| FaceError::Decode(e.to_string()))?;
        Ok(vec![image.to_rgb8()])
    }
}

/// Mean Rec.601 luma of a frame on a 0-255 scale
pub fn mean_luminance(frame: &RgbImage) -> f32 {
    let pixel_count = frame.width() as u64 * frame.height() as u64;
    if pixel_count == 0 {
        return 0.0;
    }
    let sum: f64 = frame
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
        })
        .sum();
    (sum / pixel_count as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(image: RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_mean_luminance() {
        let white = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
        assert!((mean_luminance(&white) - 255.0).abs() < 0.01);

        let black = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        assert_eq!(mean_luminance(&black), 0.0);

        let green = RgbImage::from_pixel(2, 2, Rgb([0, 100, 0]));
        assert!((mean_luminance(&green) - 58.7).abs() < 0.01);
    }

    #[test]
    fn test_still_image_decodes_one_frame() {
        let bytes = png_bytes(RgbImage::from_pixel(8, 6, Rgb([10, 20, 30])));
        let frames = StillImageDecoder.decode(&bytes, 12).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].dimensions(), (8, 6));
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        let result = StillImageDecoder.decode(b"not an image", 12);
        assert!(matches!(result, Err(FaceError::Unsupported(_))));
        assert!(matches!(
            StillImageDecoder.decode(&[], 12),
            Err(FaceError::Decode(_))
        ));
    }

    #[test]
    fn test_truncated_png_fails_to_decode() {
        let bytes = png_bytes(RgbImage::from_pixel(8, 6, Rgb([10, 20, 30])));
        let result = StillImageDecoder.decode(&bytes[..bytes.len() / 2], 12);
        assert!(matches!(result, Err(FaceError::Decode(_))));
    }
}
