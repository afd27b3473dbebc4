//! Image transforms applied before a decode retry.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

/// Shrinks so the longer side is at most `max_dimension`. Never upscales.
pub fn fit_within(image: &GrayImage, max_dimension: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    if max_dimension == 0 || longest <= max_dimension {
        return image.clone();
    }
    let ratio = max_dimension as f64 / longest as f64;
    resize(image, scaled(width, ratio), scaled(height, ratio))
}

/// Uniform scale by `factor`, flooring each side (minimum 1 px).
pub fn scale(image: &GrayImage, factor: f64) -> GrayImage {
    let (width, height) = image.dimensions();
    resize(image, scaled(width, factor), scaled(height, factor))
}

/// Contrast around mid-grey, then brightness as a multiplier.
pub fn adjust_tone(image: &GrayImage, contrast: f32, brightness: f32) -> GrayImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let v = pixel.0[0] as f32 / 255.0;
        let v = ((v - 0.5) * contrast + 0.5) * brightness;
        pixel.0[0] = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    out
}

pub fn invert(image: &GrayImage) -> GrayImage {
    let mut out = image.clone();
    imageops::invert(&mut out);
    out
}

/// Centred square covering `fraction` of the shorter side, scaled back up to
/// the shorter side so small codes get more pixels per module.
pub fn centre_crop(image: &GrayImage, fraction: f64) -> GrayImage {
    let (width, height) = image.dimensions();
    let short = width.min(height);
    let side = scaled(short, fraction).min(short);
    let x = (width - side) / 2;
    let y = (height - side) / 2;
    let crop = imageops::crop_imm(image, x, y, side, side).to_image();
    if side == short {
        return crop;
    }
    resize(&crop, short, short)
}

fn scaled(value: u32, factor: f64) -> u32 {
    ((value as f64 * factor).floor() as u32).max(1)
}

fn resize(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Mean luma, used by tests and debug logging.
pub fn mean_luma(image: &GrayImage) -> f64 {
    let count = image.pixels().len();
    if count == 0 {
        return 0.0;
    }
    image.pixels().map(|Luma([v])| *v as f64).sum::<f64>() / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_within_keeps_aspect_and_never_upscales() {
        let wide = GrayImage::new(2048, 1152);
        assert_eq!(fit_within(&wide, 1024).dimensions(), (1024, 576));

        let small = GrayImage::new(320, 240);
        assert_eq!(fit_within(&small, 1024).dimensions(), (320, 240));
    }

    #[test]
    fn test_scale_floors() {
        let image = GrayImage::new(1001, 801);
        assert_eq!(scale(&image, 0.75).dimensions(), (750, 600));
    }

    #[test]
    fn test_adjust_tone_pushes_away_from_mid_grey() {
        let mut image = GrayImage::new(3, 1);
        image.put_pixel(0, 0, Luma([64]));
        image.put_pixel(1, 0, Luma([140]));
        image.put_pixel(2, 0, Luma([200]));

        let out = adjust_tone(&image, 2.0, 1.0);
        assert!(out.get_pixel(0, 0).0[0] < 10);
        assert_eq!(out.get_pixel(2, 0).0[0], 255);

        let softer = adjust_tone(&image, 1.5, 1.0);
        assert_eq!(softer.get_pixel(1, 0).0[0], 146);

        let brighter = adjust_tone(&image, 1.0, 1.3);
        assert_eq!(brighter.get_pixel(0, 0).0[0], 83);
    }

    #[test]
    fn test_invert() {
        let image = GrayImage::from_pixel(2, 2, Luma([10]));
        assert_eq!(invert(&image).get_pixel(0, 0).0[0], 245);
    }

    #[test]
    fn test_centre_crop_takes_middle_square() {
        let mut image = GrayImage::from_pixel(200, 100, Luma([0]));
        // Paint the centre white; the edges stay black.
        for y in 20..80 {
            for x in 70..130 {
                image.put_pixel(x, y, Luma([255]));
            }
        }
        let crop = centre_crop(&image, 0.6);
        assert_eq!(crop.dimensions(), (100, 100));
        assert!(mean_luma(&crop) > 250.0);
    }
}
