use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use super::{SessionCore, SessionInner, ScanSession};
use crate::api::AttendanceApi;
use crate::capture::ResourceController;
use crate::config::{CascadeConfig, ScanConfig};
use crate::decode::{
    DecodeCascade, Debouncer, FrameSampler, NativeDetector, PollingDecoder, QrDecoder, RqrrDecoder,
};
use crate::signal::AttendanceSignal;
use crate::storage::StorageConfig;
use crate::submit::AttendanceSubmitter;
use crate::types::{FacingMode, SessionState};
use crate::verify::TokenVerifier;

/// Builds the software strategies the config enables. Native detectors are
/// platform-provided and attached separately.
pub fn cascade_from_config(config: &CascadeConfig) -> DecodeCascade {
    let decoder: Arc<dyn QrDecoder> = Arc::new(RqrrDecoder);
    let mut cascade = DecodeCascade::new(config.sample_interval());
    if config.continuous_decoder {
        cascade = cascade.with_continuous(Arc::new(PollingDecoder::new(
            Arc::clone(&decoder),
            config.continuous_poll(),
            config.frame_max_dimension,
        )));
    }
    if config.frame_sampling {
        cascade = cascade.with_sampler(FrameSampler::new(decoder, config.frame_max_dimension));
    }
    cascade
}

pub struct ScanSessionBuilder {
    controller: Arc<ResourceController>,
    api: Arc<dyn AttendanceApi>,
    cascade: DecodeCascade,
    native: Option<Arc<dyn NativeDetector>>,
    native_enabled: bool,
    signal: AttendanceSignal,
    still_decoder: Arc<dyn QrDecoder>,
    debounce: Duration,
    facing: FacingMode,
    image_max_dimension: u32,
}

impl ScanSessionBuilder {
    pub(super) fn new(controller: Arc<ResourceController>, api: Arc<dyn AttendanceApi>) -> Self {
        let defaults = CascadeConfig::default();
        Self {
            controller,
            api,
            cascade: cascade_from_config(&defaults),
            native: None,
            native_enabled: defaults.native_detector,
            signal: AttendanceSignal::default(),
            still_decoder: Arc::new(RqrrDecoder),
            debounce: defaults.debounce(),
            facing: FacingMode::default(),
            image_max_dimension: defaults.image_max_dimension,
        }
    }

    /// Applies timings, strategy switches and the marker location.
    pub fn from_config(mut self, config: &ScanConfig, storage: &StorageConfig) -> Self {
        self.cascade = cascade_from_config(&config.cascade);
        self.native_enabled = config.cascade.native_detector;
        self.debounce = config.cascade.debounce();
        self.facing = config.capture.facing;
        self.image_max_dimension = config.cascade.image_max_dimension;
        self.signal = AttendanceSignal::new(Some(config.signal.marker_path(storage)));
        self
    }

    /// Replaces the live strategies wholesale.
    pub fn cascade(mut self, cascade: DecodeCascade) -> Self {
        self.cascade = cascade;
        self
    }

    /// Platform detector tried ahead of software decoding, unless disabled
    /// in config.
    pub fn native_detector(mut self, detector: Arc<dyn NativeDetector>) -> Self {
        self.native = Some(detector);
        self
    }

    pub fn signal(mut self, signal: AttendanceSignal) -> Self {
        self.signal = signal;
        self
    }

    pub fn still_decoder(mut self, decoder: Arc<dyn QrDecoder>) -> Self {
        self.still_decoder = decoder;
        self
    }

    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    pub fn facing(mut self, facing: FacingMode) -> Self {
        self.facing = facing;
        self
    }

    pub fn image_max_dimension(mut self, max_dimension: u32) -> Self {
        self.image_max_dimension = max_dimension;
        self
    }

    pub fn build(self) -> ScanSession {
        let mut cascade = self.cascade;
        if let Some(native) = self.native {
            if self.native_enabled {
                cascade = cascade.with_native(native);
            } else {
                tracing::debug!("Native detector disabled by config");
            }
        }
        if !cascade.has_live_strategy() {
            tracing::warn!("No live decode strategy configured; only host decodes will be processed");
        }

        let (state_tx, _) = watch::channel(SessionState::Idle);
        let inner = SessionInner {
            controller: self.controller,
            cascade,
            verifier: TokenVerifier::new(Arc::clone(&self.api)),
            submitter: AttendanceSubmitter::new(self.api, self.signal.clone()),
            signal: self.signal,
            still_decoder: self.still_decoder,
            facing: self.facing,
            image_max_dimension: self.image_max_dimension,
            core: Mutex::new(SessionCore::new(Debouncer::new(self.debounce))),
            state_tx,
        };
        ScanSession {
            inner: Arc::new(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::headless::HeadlessSurface;
    use crate::decode::DecodeSink;
    use tokio::sync::mpsc;

    #[test]
    fn test_default_cascade_has_software_strategies() {
        assert!(cascade_from_config(&CascadeConfig::default()).has_live_strategy());
    }

    #[test]
    fn test_all_strategies_disabled_leaves_empty_cascade() {
        let config = CascadeConfig {
            continuous_decoder: false,
            frame_sampling: false,
            ..CascadeConfig::default()
        };
        assert!(!cascade_from_config(&config).has_live_strategy());
    }

    #[tokio::test]
    async fn test_default_cascade_leaves_sampler_idle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let run = cascade_from_config(&CascadeConfig::default())
            .launch(Arc::new(HeadlessSurface::new()), DecodeSink::new(1, tx));

        assert!(run.has_decode_loop());
        assert!(!run.is_sampling());
    }

    #[tokio::test]
    async fn test_without_continuous_decoder_sampler_runs() {
        let config = CascadeConfig {
            continuous_decoder: false,
            ..CascadeConfig::default()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let run = cascade_from_config(&config)
            .launch(Arc::new(HeadlessSurface::new()), DecodeSink::new(1, tx));

        assert!(!run.has_decode_loop());
        assert!(run.is_sampling());
    }
}
