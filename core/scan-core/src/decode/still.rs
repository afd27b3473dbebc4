//! One-shot decode of an uploaded image.

use image::GenericImageView;

use super::preprocess;
use super::{decode_with_polarity, Polarity, QrDecoder};
use crate::error::DecodeError;

const STILL_CONTRAST: f32 = 1.3;
const STILL_BRIGHTNESS: f32 = 1.1;

/// Decodes `bytes` (PNG or JPEG). Resized to at most `max_dimension`, given a
/// mild contrast lift, then decoded once in both polarities. Failure is final
/// for this image.
pub fn decode_still_image(
    bytes: &[u8],
    decoder: &dyn QrDecoder,
    max_dimension: u32,
) -> Result<String, DecodeError> {
    let image =
        image::load_from_memory(bytes).map_err(|err| DecodeError::ImageUnreadable(err.to_string()))?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidDimensions { width, height });
    }

    let luma = preprocess::fit_within(&image.to_luma8(), max_dimension);
    let toned = preprocess::adjust_tone(&luma, STILL_CONTRAST, STILL_BRIGHTNESS);
    decode_with_polarity(decoder, &toned, Polarity::Both).ok_or(DecodeError::NoCodeFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::RqrrDecoder;
    use crate::testing::{encode_png, render_qr, PredicateDecoder};
    use image::{GrayImage, Luma};

    #[test]
    fn test_decodes_png_upload() {
        let png = encode_png(&render_qr(r#"{"activityId":"A1","token":"tok123"}"#, 5));
        let content = decode_still_image(&png, &RqrrDecoder, 1280).unwrap();
        assert_eq!(content, r#"{"activityId":"A1","token":"tok123"}"#);
    }

    #[test]
    fn test_unreadable_bytes() {
        let err = decode_still_image(b"definitely not an image", &RqrrDecoder, 1280).unwrap_err();
        assert!(matches!(err, DecodeError::ImageUnreadable(_)));
    }

    #[test]
    fn test_image_without_code() {
        let png = encode_png(&GrayImage::from_pixel(120, 90, Luma([255])));
        assert_eq!(
            decode_still_image(&png, &RqrrDecoder, 1280),
            Err(DecodeError::NoCodeFound)
        );
    }

    #[test]
    fn test_large_upload_is_resized_first() {
        let decoder = PredicateDecoder::new("X", |_| false);
        let png = encode_png(&GrayImage::from_pixel(2560, 1440, Luma([200])));

        assert!(decode_still_image(&png, &decoder, 1280).is_err());
        assert_eq!(decoder.attempts(), vec![(1280, 720), (1280, 720)]);
    }
}
