use std::sync::Arc;

use super::{MediaTrack, RenderSurface, TrackCapabilities};
use crate::error::CaptureError;

/// An open capture device. Dropping it releases the hardware.
pub struct CaptureHandle {
    tracks: Vec<Arc<dyn MediaTrack>>,
    surface: Arc<dyn RenderSurface>,
    capabilities: TrackCapabilities,
    torch_on: bool,
    attached: bool,
    released: bool,
}

impl CaptureHandle {
    pub(crate) fn new(tracks: Vec<Arc<dyn MediaTrack>>, surface: Arc<dyn RenderSurface>) -> Self {
        let capabilities = tracks
            .iter()
            .map(|track| track.capabilities())
            .fold(TrackCapabilities::default(), |acc, caps| TrackCapabilities {
                torch: acc.torch || caps.torch,
                continuous_focus: acc.continuous_focus || caps.continuous_focus,
                continuous_exposure: acc.continuous_exposure || caps.continuous_exposure,
            });
        Self {
            tracks,
            surface,
            capabilities,
            torch_on: false,
            attached: false,
            released: false,
        }
    }

    /// Puts the tracks on the surface. Only an attached handle detaches the
    /// surface on release, so a handle that never got this far cannot blank
    /// a newer owner's preview.
    pub(crate) fn attach(&mut self) {
        self.surface.attach(&self.tracks);
        self.attached = true;
    }

    pub fn capabilities(&self) -> TrackCapabilities {
        self.capabilities
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn torch_on(&self) -> bool {
        self.torch_on
    }

    pub(crate) fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    /// Takes ownership of tracks a strategy bound on its own. Tracks already
    /// owned (same id) are ignored.
    pub(crate) fn adopt(&mut self, tracks: Vec<Arc<dyn MediaTrack>>) -> usize {
        let mut adopted = 0;
        for track in tracks {
            let id = track.id();
            if self.tracks.iter().any(|owned| owned.id() == id) {
                continue;
            }
            self.tracks.push(track);
            adopted += 1;
        }
        adopted
    }

    pub(crate) fn set_torch(&mut self, on: bool) -> Result<(), CaptureError> {
        if !self.capabilities.torch {
            return Err(CaptureError::Unsupported("torch"));
        }
        for track in self.tracks.iter().filter(|t| t.capabilities().torch) {
            track.set_torch(on)?;
        }
        self.torch_on = on;
        Ok(())
    }

    /// Tears the device down. Returns `false` when already released.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;

        if self.torch_on {
            for track in self.tracks.iter().filter(|t| t.capabilities().torch) {
                if let Err(err) = track.set_torch(false) {
                    tracing::debug!(error = %err, "Failed to switch torch off during release");
                }
            }
            self.torch_on = false;
        }
        for track in &self.tracks {
            track.set_enabled(false);
            track.stop();
        }
        if self.attached {
            self.surface.detach();
            self.attached = false;
        }

        tracing::debug!(tracks = self.tracks.len(), "Capture device released");
        self.tracks.clear();
        true
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("tracks", &self.tracks.len())
            .field("capabilities", &self.capabilities)
            .field("torch_on", &self.torch_on)
            .field("attached", &self.attached)
            .field("released", &self.released)
            .finish()
    }
}
