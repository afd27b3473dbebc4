use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{CameraBackend, CaptureHandle, CaptureRequest, MediaTrack, RenderSurface, TrackCapabilities};
use crate::error::CaptureError;
use crate::types::FacingMode;

/// Summary of a granted device, for logging and host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureInfo {
    pub tracks: usize,
    pub torch: bool,
    pub continuous_focus: bool,
}

/// Owns at most one `CaptureHandle`.
///
/// `release` bumps an epoch under the same lock that guards the handle slot,
/// so a stream granted after the session gave up is stopped on arrival
/// instead of being installed.
pub struct ResourceController {
    backend: Arc<dyn CameraBackend>,
    surface: Arc<dyn RenderSurface>,
    request: CaptureRequest,
    slot: Mutex<Option<CaptureHandle>>,
    epoch: AtomicU64,
}

impl ResourceController {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        surface: Arc<dyn RenderSurface>,
        request: CaptureRequest,
    ) -> Self {
        Self {
            backend,
            surface,
            request,
            slot: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<CaptureHandle>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn acquire(&self, facing: FacingMode) -> Result<CaptureInfo, CaptureError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let request = self.request.clone().with_facing(facing);

        let stream = match self.backend.open(&request).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = %err, facing = ?facing, "Camera acquisition failed");
                return Err(err);
            }
        };

        if stream.tracks.is_empty() {
            tracing::warn!("Camera granted a stream without tracks");
            return Err(CaptureError::DeviceNotFound);
        }

        let mut handle = CaptureHandle::new(stream.tracks, Arc::clone(&self.surface));
        let caps = handle.capabilities();
        let track_count = handle.track_count();
        if caps.continuous_focus {
            apply_focus_hints(handle.tracks());
        }

        {
            let mut slot = self.slot();
            if self.epoch.load(Ordering::SeqCst) != epoch {
                drop(slot);
                handle.release();
                tracing::debug!("Camera granted after stop; released immediately");
                return Err(CaptureError::Cancelled);
            }
            // A handle left over from an acquire without release detaches
            // before the new one attaches.
            if let Some(mut previous) = slot.take() {
                previous.release();
            }
            handle.attach();
            *slot = Some(handle);
        }

        let info = CaptureInfo {
            tracks: track_count,
            torch: caps.torch,
            continuous_focus: caps.continuous_focus,
        };
        tracing::info!(
            tracks = info.tracks,
            torch = info.torch,
            continuous_focus = info.continuous_focus,
            "Camera acquired"
        );
        Ok(info)
    }

    /// Releases the held device, if any. Returns whether hardware was torn
    /// down by this call. Safe to call any number of times.
    pub fn release(&self) -> bool {
        let handle = {
            let mut slot = self.slot();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            slot.take()
        };
        match handle {
            Some(mut handle) => handle.release(),
            None => false,
        }
    }

    /// Registers tracks a decode strategy bound by itself. Without a live
    /// handle they are stopped on the spot.
    pub fn adopt_tracks(&self, tracks: Vec<Arc<dyn MediaTrack>>) -> usize {
        let mut slot = self.slot();
        match slot.as_mut() {
            Some(handle) => {
                let adopted = handle.adopt(tracks);
                if adopted > 0 {
                    tracing::debug!(adopted, "Adopted re-bound capture tracks");
                }
                adopted
            }
            None => {
                drop(slot);
                for track in tracks {
                    track.set_enabled(false);
                    track.stop();
                }
                0
            }
        }
    }

    pub fn set_illumination(&self, on: bool) -> Result<(), CaptureError> {
        let mut slot = self.slot();
        let handle = slot.as_mut().ok_or(CaptureError::NotActive)?;
        handle.set_torch(on)
    }

    pub fn illumination_on(&self) -> bool {
        self.slot().as_ref().is_some_and(CaptureHandle::torch_on)
    }

    pub fn is_active(&self) -> bool {
        self.slot().is_some()
    }

    pub fn capabilities(&self) -> Option<TrackCapabilities> {
        self.slot().as_ref().map(CaptureHandle::capabilities)
    }

    pub fn surface(&self) -> Arc<dyn RenderSurface> {
        Arc::clone(&self.surface)
    }
}

fn apply_focus_hints(tracks: &[Arc<dyn MediaTrack>]) {
    for track in tracks {
        let caps = track.capabilities();
        if !caps.continuous_focus {
            continue;
        }
        if let Err(err) = track.apply_continuous_focus(caps.continuous_exposure) {
            tracing::debug!(error = %err, track = %track.id(), "Continuous focus not applied");
        }
    }
}
