//! Wires the live strategies to one event channel.
//!
//! Every strategy reports through a `DecodeSink` stamped with the session
//! generation that launched it. The session drains the channel and decides
//! which result wins; strategies never talk to the session directly.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{ContinuousDecoder, DecodeLoop, FrameSampler, NativeDetector, NativeDetectorStrategy};
use crate::capture::{MediaTrack, RenderSurface};
use crate::types::DecodeStrategy;

pub enum CascadeEvent {
    Decoded {
        generation: u64,
        raw: String,
        strategy: DecodeStrategy,
    },
    TracksAdopted {
        generation: u64,
        tracks: Vec<Arc<dyn MediaTrack>>,
    },
}

impl CascadeEvent {
    pub fn generation(&self) -> u64 {
        match self {
            CascadeEvent::Decoded { generation, .. }
            | CascadeEvent::TracksAdopted { generation, .. } => *generation,
        }
    }
}

impl fmt::Debug for CascadeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeEvent::Decoded {
                generation,
                raw,
                strategy,
            } => f
                .debug_struct("Decoded")
                .field("generation", generation)
                .field("len", &raw.len())
                .field("strategy", strategy)
                .finish(),
            CascadeEvent::TracksAdopted { generation, tracks } => f
                .debug_struct("TracksAdopted")
                .field("generation", generation)
                .field("tracks", &tracks.len())
                .finish(),
        }
    }
}

/// Sending half handed to strategies.
#[derive(Clone)]
pub struct DecodeSink {
    generation: u64,
    tx: mpsc::UnboundedSender<CascadeEvent>,
}

impl DecodeSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<CascadeEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `false` once the session has gone away.
    pub fn decoded(&self, raw: String, strategy: DecodeStrategy) -> bool {
        self.tx
            .send(CascadeEvent::Decoded {
                generation: self.generation,
                raw,
                strategy,
            })
            .is_ok()
    }

    pub fn adopt_tracks(&self, tracks: Vec<Arc<dyn MediaTrack>>) -> bool {
        self.tx
            .send(CascadeEvent::TracksAdopted {
                generation: self.generation,
                tracks,
            })
            .is_ok()
    }
}

/// Strategy set for live capture. Absent strategies are skipped.
#[derive(Clone)]
pub struct DecodeCascade {
    native: Option<Arc<dyn NativeDetector>>,
    continuous: Option<Arc<dyn ContinuousDecoder>>,
    sampler: Option<FrameSampler>,
    sample_interval: Duration,
}

impl DecodeCascade {
    pub fn new(sample_interval: Duration) -> Self {
        Self {
            native: None,
            continuous: None,
            sampler: None,
            sample_interval,
        }
    }

    pub fn with_native(mut self, detector: Arc<dyn NativeDetector>) -> Self {
        self.native = Some(detector);
        self
    }

    pub fn with_continuous(mut self, decoder: Arc<dyn ContinuousDecoder>) -> Self {
        self.continuous = Some(decoder);
        self
    }

    pub fn with_sampler(mut self, sampler: FrameSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn has_live_strategy(&self) -> bool {
        self.native.is_some() || self.continuous.is_some() || self.sampler.is_some()
    }

    /// Starts the strategies against `surface`.
    pub fn launch(&self, surface: Arc<dyn RenderSurface>, sink: DecodeSink) -> CascadeRun {
        let cancel = CancellationToken::new();

        let decode_loop = self.continuous.as_ref().and_then(|decoder| {
            match decoder.start(Arc::clone(&surface), sink.clone()) {
                Ok(decode_loop) => Some(decode_loop),
                Err(err) => {
                    tracing::debug!(error = %err, "Continuous decoder unavailable; sampling frames");
                    None
                }
            }
        });

        let native = self.native.clone().map(NativeDetectorStrategy::new);
        // Manual sampling would race the continuous loop for the surface.
        let sampler = if decode_loop.is_some() {
            None
        } else {
            self.sampler.clone()
        };

        let sampler_task = (native.is_some() || sampler.is_some()).then(|| {
            tokio::spawn(sample_frames(
                surface,
                sink.clone(),
                native,
                sampler,
                self.sample_interval,
                cancel.clone(),
            ))
        });

        tracing::debug!(
            generation = sink.generation(),
            native = self.native.is_some(),
            continuous = decode_loop.is_some(),
            sampling = sampler_task.is_some(),
            "Decode cascade launched"
        );

        CascadeRun {
            cancel,
            sampler_task,
            decode_loop,
        }
    }
}

async fn sample_frames(
    surface: Arc<dyn RenderSurface>,
    sink: DecodeSink,
    native: Option<NativeDetectorStrategy>,
    sampler: Option<FrameSampler>,
    interval: Duration,
    cancel: CancellationToken,
) {
    // Dropped with this task, which aborts any pending detection.
    let mut detections = JoinSet::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        while detections.try_join_next().is_some() {}

        let Some(frame) = surface.snapshot() else {
            continue;
        };

        if let Some(native) = &native {
            native.try_dispatch(frame.clone(), sink.clone(), &mut detections);
        }

        if let Some(sampler) = &sampler {
            // Up to seven decoder passes; keep them off the async workers.
            let sampler = sampler.clone();
            let decoded = tokio::select! {
                _ = cancel.cancelled() => break,
                joined = tokio::task::spawn_blocking(move || sampler.decode_frame(&frame)) => joined,
            };
            match decoded {
                Ok(Some((raw, pass))) => {
                    tracing::debug!(generation = sink.generation(), %pass, "Frame sample decoded");
                    if !sink.decoded(raw, DecodeStrategy::FrameSampling) {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, "Frame sampling task failed"),
            }
        }
    }
}

/// Live strategies for one scanning generation. Dropping it stops them all.
pub struct CascadeRun {
    cancel: CancellationToken,
    sampler_task: Option<JoinHandle<()>>,
    decode_loop: Option<DecodeLoop>,
}

impl CascadeRun {
    pub fn has_decode_loop(&self) -> bool {
        self.decode_loop.is_some()
    }

    pub fn is_sampling(&self) -> bool {
        self.sampler_task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.sampler_task.take() {
            task.abort();
        }
        if let Some(mut decode_loop) = self.decode_loop.take() {
            decode_loop.stop();
        }
    }
}

impl Drop for CascadeRun {
    fn drop(&mut self) {
        self.shutdown();
    }
}
