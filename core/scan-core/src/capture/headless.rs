//! Stand-ins for hosts without a camera (CLI, kiosks fed by a scanner gun).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{CameraBackend, CaptureRequest, CaptureStream, MediaTrack, RenderSurface};
use crate::decode::Frame;
use crate::error::CaptureError;

/// Backend that never finds a device. Still-image and direct-decode entry
/// points keep working.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCameraBackend;

#[async_trait]
impl CameraBackend for NoCameraBackend {
    async fn open(&self, _request: &CaptureRequest) -> Result<CaptureStream, CaptureError> {
        Err(CaptureError::DeviceNotFound)
    }
}

/// Surface whose frames are pushed by the host.
#[derive(Default)]
pub struct HeadlessSurface {
    attached: AtomicBool,
    frame: Mutex<Option<Frame>>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&self, frame: Frame) {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }
}

impl RenderSurface for HeadlessSurface {
    fn attach(&self, _tracks: &[Arc<dyn MediaTrack>]) {
        self.attached.store(true, Ordering::SeqCst);
    }

    fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
        self.frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn snapshot(&self) -> Option<Frame> {
        if !self.is_attached() {
            return None;
        }
        self.frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[tokio::test]
    async fn test_no_camera_reports_missing_device() {
        let result = NoCameraBackend.open(&CaptureRequest::default()).await;
        assert!(matches!(result, Err(CaptureError::DeviceNotFound)));
    }

    #[test]
    fn test_headless_surface_only_serves_frames_while_attached() {
        let surface = HeadlessSurface::new();
        surface.push_frame(Frame::from_luma(GrayImage::new(4, 4)));
        assert!(surface.snapshot().is_none());

        surface.attach(&[]);
        surface.push_frame(Frame::from_luma(GrayImage::new(4, 4)));
        assert!(surface.snapshot().is_some());

        surface.detach();
        assert!(surface.snapshot().is_none());
    }
}
