//! Still-image encoding

use crate::capture::{Frame, PixelFormat};
use crate::utils::error::{CameraError, CameraResult};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// Encode a raw frame as JPEG.
///
/// Output is deterministic for identical input and quality. Zero-sized and
/// malformed frames are rejected with `EncodingFailed`.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> CameraResult<Vec<u8>> {
    frame.validate()?;

    let color = match frame.format() {
        PixelFormat::Rgb24 => ExtendedColorType::Rgb8,
        PixelFormat::Gray8 => ExtendedColorType::L8,
    };

    let mut buffer = Vec::with_capacity(frame.expected_len() / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder
        .encode(frame.data(), frame.width(), frame.height(), color)
        .map_err(|e| {
            CameraError::EncodingFailed(format!("jpeg frame #{}: {}", frame.sequence(), e))
        })?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn gradient(width: u32, height: u32) -> Frame {
        let data = (0..width * height)
            .flat_map(|i| {
                let v = (i % 256) as u8;
                [v, 255 - v, v / 2]
            })
            .collect();
        Frame::new(width, height, PixelFormat::Rgb24, data, 0)
    }

    #[test]
    fn test_encoded_jpeg_decodes_to_frame_size() {
        let jpeg = encode_jpeg(&gradient(64, 48), 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let frame = gradient(32, 32);
        assert_eq!(encode_jpeg(&frame, 70).unwrap(), encode_jpeg(&frame, 70).unwrap());
    }

    #[test]
    fn test_grayscale_frame() {
        let frame = Frame::new(16, 8, PixelFormat::Gray8, vec![128; 128], 0);
        let decoded = image::load_from_memory(&encode_jpeg(&frame, 90).unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (16, 8));
    }

    #[test]
    fn test_rejects_malformed_frames() {
        let empty = Frame::new(0, 0, PixelFormat::Rgb24, Vec::new(), 0);
        assert!(matches!(encode_jpeg(&empty, 80), Err(CameraError::EncodingFailed(_))));

        let short = Frame::new(10, 10, PixelFormat::Rgb24, vec![0; 10], 1);
        assert!(matches!(encode_jpeg(&short, 80), Err(CameraError::EncodingFailed(_))));
    }
}
