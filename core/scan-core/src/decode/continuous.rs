//! Continuous software decoder bound to the live surface.
//!
//! A decoder library typically owns its own polling loop (and sometimes its
//! own stream). `ContinuousDecoder::start` hands it the surface and a sink;
//! the returned `DecodeLoop` is the only way to stop it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{decode_with_polarity, preprocess, DecodeSink, Polarity, QrDecoder};
use crate::capture::RenderSurface;
use crate::error::DecodeError;
use crate::types::DecodeStrategy;

pub trait ContinuousDecoder: Send + Sync {
    /// Starts the loop. Decodes go to `sink.decoded`; any tracks the decoder
    /// binds itself go to `sink.adopt_tracks`.
    fn start(
        &self,
        surface: Arc<dyn RenderSurface>,
        sink: DecodeSink,
    ) -> Result<DecodeLoop, DecodeError>;
}

/// Running decoder loop. Stopped on `stop()` or drop.
pub struct DecodeLoop {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DecodeLoop {
    pub fn new(cancel: CancellationToken, task: Option<JoinHandle<()>>) -> Self {
        Self { cancel, task }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().map_or(true, |t| !t.is_finished())
    }

    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for DecodeLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Built-in loop: snapshot the surface every `poll`, decode in both
/// polarities, stop at the first result.
#[derive(Clone)]
pub struct PollingDecoder {
    decoder: Arc<dyn QrDecoder>,
    poll: Duration,
    max_dimension: u32,
}

impl PollingDecoder {
    pub fn new(decoder: Arc<dyn QrDecoder>, poll: Duration, max_dimension: u32) -> Self {
        Self {
            decoder,
            poll,
            max_dimension,
        }
    }
}

impl ContinuousDecoder for PollingDecoder {
    fn start(
        &self,
        surface: Arc<dyn RenderSurface>,
        sink: DecodeSink,
    ) -> Result<DecodeLoop, DecodeError> {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let decoder = Arc::clone(&self.decoder);
        let poll = self.poll;
        let max_dimension = self.max_dimension;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(poll) => {}
                }
                let Some(frame) = surface.snapshot() else {
                    continue;
                };
                let decoder = Arc::clone(&decoder);
                let attempt = tokio::task::spawn_blocking(move || {
                    let image = preprocess::fit_within(&frame.to_luma(), max_dimension);
                    decode_with_polarity(decoder.as_ref(), &image, Polarity::Both)
                });
                let decoded = tokio::select! {
                    _ = token.cancelled() => break,
                    joined = attempt => joined,
                };
                match decoded {
                    Ok(Some(raw)) => {
                        sink.decoded(raw, DecodeStrategy::ContinuousDecoder);
                        break;
                    }
                    Ok(None) => {}
                    Err(err) => tracing::warn!(error = %err, "Continuous decode attempt failed"),
                }
            }
        });

        Ok(DecodeLoop::new(cancel, Some(task)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::headless::HeadlessSurface;
    use crate::decode::{CascadeEvent, Frame};
    use crate::testing::PredicateDecoder;
    use image::{GrayImage, Luma};
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_first_result_then_ends() {
        let surface = Arc::new(HeadlessSurface::new());
        surface.attach(&[]);
        let decoder = Arc::new(PredicateDecoder::new("X", |image| {
            preprocess::mean_luma(image) > 100.0
        }));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let polling = PollingDecoder::new(decoder.clone(), Duration::from_millis(50), 1024);

        let decode_loop = polling
            .start(surface.clone(), DecodeSink::new(3, tx))
            .unwrap();

        surface.push_frame(Frame::from_luma(GrayImage::from_pixel(16, 16, Luma([0]))));
        tokio::time::sleep(Duration::from_millis(120)).await;
        // Dark frame: only the inverted pass is bright enough.
        let event = rx.recv().await.expect("decoded");
        match event {
            CascadeEvent::Decoded {
                generation,
                raw,
                strategy,
            } => {
                assert_eq!(generation, 3);
                assert_eq!(raw, "X");
                assert_eq!(strategy, DecodeStrategy::ContinuousDecoder);
            }
            other => panic!("unexpected event {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!decode_loop.is_running());
    }

    #[tokio::test]
    async fn test_attempts_run_off_the_runtime_thread() {
        let surface = Arc::new(HeadlessSurface::new());
        surface.attach(&[]);
        surface.push_frame(Frame::from_luma(GrayImage::from_pixel(16, 16, Luma([255]))));
        let seen = Arc::new(std::sync::Mutex::new(None));
        let decoder = Arc::new(PredicateDecoder::new("X", {
            let seen = Arc::clone(&seen);
            move |_: &image::GrayImage| {
                *seen.lock().unwrap() = Some(std::thread::current().id());
                true
            }
        }));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let polling = PollingDecoder::new(decoder, Duration::from_millis(5), 1024);

        let _decode_loop = polling.start(surface, DecodeSink::new(1, tx)).unwrap();
        rx.recv().await.expect("decoded");

        let decoded_on = seen.lock().unwrap().expect("decoder ran");
        assert_ne!(decoded_on, std::thread::current().id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_loop() {
        let surface = Arc::new(HeadlessSurface::new());
        let decoder = Arc::new(PredicateDecoder::new("X", |_| false));
        let (tx, _rx) = mpsc::unbounded_channel();
        let polling = PollingDecoder::new(decoder.clone(), Duration::from_millis(50), 1024);

        let mut decode_loop = polling.start(surface, DecodeSink::new(1, tx)).unwrap();
        assert!(decode_loop.is_running());
        decode_loop.stop();
        assert!(!decode_loop.is_running());
        decode_loop.stop();
    }
}
