//! Manual frame sampling: software decode of a snapshot with retry passes.
//!
//! Runs only when no continuous decoder loop owns the surface. Each tick
//! tries, in order, stopping at the first hit:
//!
//! 1. the frame downsampled to the configured maximum, normal polarity
//! 2. contrast ×2.0 / brightness ×1.3, both polarities
//! 3. a 0.75× downscale when the frame exceeds 640 px, both polarities
//! 4. the centred 70% region, both polarities

use std::fmt;
use std::sync::Arc;

use super::preprocess;
use super::{decode_with_polarity, Frame, Polarity, QrDecoder};

const TONE_CONTRAST: f32 = 2.0;
const TONE_BRIGHTNESS: f32 = 1.3;
const DOWNSCALE_FACTOR: f64 = 0.75;
const DOWNSCALE_THRESHOLD: u32 = 640;
const ROI_FRACTION: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplePass {
    Plain,
    ToneAdjusted,
    Downscaled,
    CentreCrop,
}

impl fmt::Display for SamplePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SamplePass::Plain => "plain",
            SamplePass::ToneAdjusted => "tone_adjusted",
            SamplePass::Downscaled => "downscaled",
            SamplePass::CentreCrop => "centre_crop",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct FrameSampler {
    decoder: Arc<dyn QrDecoder>,
    max_dimension: u32,
}

impl FrameSampler {
    pub fn new(decoder: Arc<dyn QrDecoder>, max_dimension: u32) -> Self {
        Self {
            decoder,
            max_dimension,
        }
    }

    pub fn decode_frame(&self, frame: &Frame) -> Option<(String, SamplePass)> {
        let decoder = self.decoder.as_ref();
        let base = preprocess::fit_within(&frame.to_luma(), self.max_dimension);

        if let Some(content) = decode_with_polarity(decoder, &base, Polarity::Normal) {
            return Some((content, SamplePass::Plain));
        }

        let toned = preprocess::adjust_tone(&base, TONE_CONTRAST, TONE_BRIGHTNESS);
        if let Some(content) = decode_with_polarity(decoder, &toned, Polarity::Both) {
            return Some((content, SamplePass::ToneAdjusted));
        }

        let (width, height) = base.dimensions();
        if width > DOWNSCALE_THRESHOLD || height > DOWNSCALE_THRESHOLD {
            let smaller = preprocess::scale(&base, DOWNSCALE_FACTOR);
            if let Some(content) = decode_with_polarity(decoder, &smaller, Polarity::Both) {
                return Some((content, SamplePass::Downscaled));
            }
        }

        let roi = preprocess::centre_crop(&base, ROI_FRACTION);
        decode_with_polarity(decoder, &roi, Polarity::Both)
            .map(|content| (content, SamplePass::CentreCrop))
    }
}
