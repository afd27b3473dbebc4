//! Resource controller: sole owner of the capture device.
//!
//! Hosts plug in their camera stack through three traits:
//!
//! - `CameraBackend` opens a stream for a `CaptureRequest`
//! - `MediaTrack` is one track of that stream (torch, focus, stop)
//! - `RenderSurface` is where frames are shown and snapshotted
//!
//! Everything else in the engine talks to the `ResourceController`, never to
//! tracks directly, so teardown has exactly one path.

mod controller;
mod handle;
pub mod headless;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::CaptureConfig;
use crate::decode::Frame;
use crate::error::CaptureError;
use crate::types::FacingMode;

pub use controller::{CaptureInfo, ResourceController};
pub use handle::CaptureHandle;

/// Resolution and facing hints for `CameraBackend::open`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub aspect_ratio: f64,
}

impl CaptureRequest {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            facing: config.facing,
            ideal_width: config.ideal_width,
            ideal_height: config.ideal_height,
            min_width: config.min_width,
            min_height: config.min_height,
            aspect_ratio: 16.0 / 9.0,
        }
    }

    pub fn with_facing(mut self, facing: FacingMode) -> Self {
        self.facing = facing;
        self
    }
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self::from_config(&CaptureConfig::default())
    }
}

/// What a track reports it can do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackCapabilities {
    pub torch: bool,
    pub continuous_focus: bool,
    pub continuous_exposure: bool,
}

/// One track of an open capture stream.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> String;

    fn capabilities(&self) -> TrackCapabilities;

    /// Applies continuous focus, plus continuous exposure when `exposure` is set.
    fn apply_continuous_focus(&self, exposure: bool) -> Result<(), CaptureError>;

    fn set_torch(&self, on: bool) -> Result<(), CaptureError>;

    fn set_enabled(&self, enabled: bool);

    /// Stops the track and frees the hardware. Must tolerate repeated calls.
    fn stop(&self);
}

/// A freshly opened stream.
pub struct CaptureStream {
    pub tracks: Vec<Arc<dyn MediaTrack>>,
}

impl CaptureStream {
    pub fn new(tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self { tracks }
    }
}

#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Requests a device. Platform failures should be mapped with
    /// `CaptureError::from_platform_name`.
    async fn open(&self, request: &CaptureRequest) -> Result<CaptureStream, CaptureError>;
}

/// Where the live stream is shown.
pub trait RenderSurface: Send + Sync {
    fn attach(&self, tracks: &[Arc<dyn MediaTrack>]);

    fn detach(&self);

    /// Current frame, or `None` while the surface has no decodable data yet.
    fn snapshot(&self) -> Option<Frame>;
}
