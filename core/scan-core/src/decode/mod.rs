//! Decode cascade: turns live frames or a still image into a QR string.
//!
//! Strategies, cheapest first:
//!
//! 1. `native`: a platform detector, sampled on the cascade tick
//! 2. `continuous`: a library-driven loop polling the live surface
//! 3. `sampler`: manual frame sampling with preprocessing passes
//! 4. `still`: one-shot decode of an uploaded image
//!
//! `cascade` wires 1–3 to a capture session; `still` is called directly.

pub mod cascade;
pub mod continuous;
pub mod debounce;
pub mod native;
pub mod preprocess;
pub mod sampler;
pub mod still;

use image::{DynamicImage, GrayImage, RgbaImage};

use crate::error::DecodeError;

pub use cascade::{CascadeEvent, CascadeRun, DecodeCascade, DecodeSink};
pub use continuous::{ContinuousDecoder, DecodeLoop, PollingDecoder};
pub use debounce::Debouncer;
pub use native::{NativeDetector, NativeDetectorStrategy};
pub use sampler::FrameSampler;
pub use still::decode_still_image;

/// One captured frame.
#[derive(Debug, Clone)]
pub struct Frame {
    image: DynamicImage,
}

impl Frame {
    /// Wraps raw RGBA8 pixels as delivered by most camera stacks.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::InvalidDimensions { width, height });
        }
        let image = RgbaImage::from_raw(width, height, pixels)
            .ok_or(DecodeError::InvalidDimensions { width, height })?;
        Ok(Self {
            image: DynamicImage::ImageRgba8(image),
        })
    }

    pub fn from_luma(image: GrayImage) -> Self {
        Self {
            image: DynamicImage::ImageLuma8(image),
        }
    }

    pub fn from_image(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn to_luma(&self) -> GrayImage {
        self.image.to_luma8()
    }
}

/// Software QR decoder over a greyscale image.
pub trait QrDecoder: Send + Sync {
    /// Returns the first non-empty payload found, dark-on-light only.
    fn decode(&self, image: &GrayImage) -> Option<String>;
}

/// `rqrr`-backed decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct RqrrDecoder;

impl QrDecoder for RqrrDecoder {
    fn decode(&self, image: &GrayImage) -> Option<String> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                image.get_pixel(x as u32, y as u32).0[0]
            });
        prepared
            .detect_grids()
            .into_iter()
            .filter_map(|grid| grid.decode().ok())
            .map(|(_, content)| content)
            .find(|content| !content.trim().is_empty())
    }
}

/// Which contrast polarities to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Dark modules on a light background only.
    Normal,
    /// Normal first, then inverted (light-on-dark codes, glare on screens).
    Both,
}

pub fn decode_with_polarity(
    decoder: &dyn QrDecoder,
    image: &GrayImage,
    polarity: Polarity,
) -> Option<String> {
    if let Some(content) = decoder.decode(image) {
        return Some(content);
    }
    match polarity {
        Polarity::Normal => None,
        Polarity::Both => decoder.decode(&preprocess::invert(image)),
    }
}
