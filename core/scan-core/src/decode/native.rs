//! Native platform detector strategy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;

use super::{DecodeSink, Frame};
use crate::error::DecodeError;
use crate::types::DecodeStrategy;

/// A platform barcode detector (e.g. the OS vision framework).
#[async_trait]
pub trait NativeDetector: Send + Sync {
    /// Detects QR codes in `frame`; returns the first payload, if any.
    async fn detect(&self, frame: Frame) -> Result<Option<String>, DecodeError>;
}

/// Clears the in-flight flag however the detection ends, including abort.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Dispatches at most one detection at a time.
pub struct NativeDetectorStrategy {
    detector: Arc<dyn NativeDetector>,
    in_flight: Arc<AtomicBool>,
}

impl NativeDetectorStrategy {
    pub fn new(detector: Arc<dyn NativeDetector>) -> Self {
        Self {
            detector,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Starts a detection on `tasks` unless one is pending. Returns whether
    /// a detection was started. Dropping `tasks` aborts it.
    pub fn try_dispatch(&self, frame: Frame, sink: DecodeSink, tasks: &mut JoinSet<()>) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        let detector = Arc::clone(&self.detector);

        tasks.spawn(async move {
            let _guard = guard;
            match detector.detect(frame).await {
                Ok(Some(raw)) if !raw.trim().is_empty() => {
                    sink.decoded(raw, DecodeStrategy::NativeDetector);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(error = %err, "Native detector failed on frame");
                }
            }
        });
        true
    }
}
