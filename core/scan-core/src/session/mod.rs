//! Scan session: the state machine that ties capture, decoding,
//! verification and submission together.
//!
//! ```text
//! start() ──▶ acquire camera ──▶ launch cascade ──▶ first decode wins
//!                                                        │
//!        release camera ◀── shut down cascade ◀──────────┘
//!              │
//!              ▼
//!    normalize ──▶ verify ──▶ submit ──▶ Terminal(outcome)
//! ```
//!
//! All mutable state sits behind one lock. Cascade results and flight
//! results carry the generation or flight id they were started under, and
//! anything stamped with a superseded id is dropped on arrival.

mod builder;
mod transition;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::api::AttendanceApi;
use crate::capture::{ResourceController, TrackCapabilities};
use crate::decode::{
    decode_still_image, CascadeEvent, DecodeCascade, DecodeSink, Debouncer, QrDecoder,
};
use crate::error::{ApiError, CaptureError, DecodeError, VerifyError};
use crate::payload;
use crate::signal::AttendanceSignal;
use crate::submit::AttendanceSubmitter;
use crate::types::{
    AttendanceUpdated, DecodeStrategy, FacingMode, RejectReason, ScanOutcome, SessionState,
};
use crate::verify::{TokenVerifier, Verification};

pub use builder::{cascade_from_config, ScanSessionBuilder};
pub use transition::{next_state, SessionEvent};

/// Handle to one scan session. Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct ScanSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    controller: Arc<ResourceController>,
    cascade: DecodeCascade,
    verifier: TokenVerifier,
    submitter: AttendanceSubmitter,
    signal: AttendanceSignal,
    still_decoder: Arc<dyn QrDecoder>,
    facing: FacingMode,
    image_max_dimension: u32,
    core: Mutex<SessionCore>,
    state_tx: watch::Sender<SessionState>,
}

struct SessionCore {
    state: SessionState,
    /// Bumped whenever live strategies are torn down.
    generation: u64,
    /// Generation of the `start` awaiting the camera, if any.
    starting: Option<u64>,
    debounce: Debouncer,
    run: Option<crate::decode::CascadeRun>,
    flight: Option<Flight>,
    next_flight: u64,
    last_outcome: Option<ScanOutcome>,
}

struct Flight {
    id: u64,
    task: AbortHandle,
}

impl SessionCore {
    fn new(debounce: Debouncer) -> Self {
        Self {
            state: SessionState::Idle,
            generation: 0,
            starting: None,
            debounce,
            run: None,
            flight: None,
            next_flight: 0,
            last_outcome: None,
        }
    }

    fn flight_id(&self) -> Option<u64> {
        self.flight.as_ref().map(|flight| flight.id)
    }
}

impl SessionInner {
    fn core(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self, core: &mut SessionCore, next: SessionState) {
        if next != core.state {
            tracing::debug!(from = %core.state, to = %next, "Session transition");
        }
        if let Some(outcome) = next.outcome() {
            core.last_outcome = Some(outcome.clone());
        }
        core.state = next.clone();
        self.state_tx.send_replace(next);
    }

    /// Applies `event`; returns `false` when it does not fit the current state.
    fn apply(&self, core: &mut SessionCore, event: SessionEvent) -> bool {
        match next_state(&core.state, event) {
            Some(next) => {
                self.commit(core, next);
                true
            }
            None => false,
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(flight) = core.flight.take() {
            flight.task.abort();
        }
        core.run.take();
        self.controller.release();
    }
}

/// Clears `starting` if the owning `start` future is dropped mid-acquire.
struct StartGuard<'a> {
    inner: &'a SessionInner,
    generation: u64,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        let mut core = self.inner.core();
        if core.starting == Some(self.generation) {
            core.starting = None;
        }
    }
}

impl ScanSession {
    pub fn builder(
        controller: Arc<ResourceController>,
        api: Arc<dyn AttendanceApi>,
    ) -> ScanSessionBuilder {
        ScanSessionBuilder::new(controller, api)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Observation
    // ─────────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.inner.core().state.clone()
    }

    /// Outcome shown to the user; survives `stop` and is cleared by `reset`
    /// or the next `start`.
    pub fn last_outcome(&self) -> Option<ScanOutcome> {
        self.inner.core().last_outcome.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn attendance_updates(&self) -> broadcast::Receiver<AttendanceUpdated> {
        self.inner.signal.subscribe()
    }

    pub fn illumination_on(&self) -> bool {
        self.inner.controller.illumination_on()
    }

    pub fn capabilities(&self) -> Option<TrackCapabilities> {
        self.inner.controller.capabilities()
    }

    /// Resolves once the session is `Idle` or `Terminal`.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.inner.state_tx.subscribe();
        let settled = match rx.wait_for(SessionState::is_settled).await {
            Ok(state) => Some(state.clone()),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| self.state())
    }

    pub async fn wait_for_outcome(&self) -> Option<ScanOutcome> {
        self.settled().await.outcome().cloned()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Acquires the camera and launches the decode cascade. A call while a
    /// start is in flight, or while scanning or processing, is a no-op.
    /// Returns the state once the camera request has settled.
    pub async fn start(&self) -> SessionState {
        let generation = {
            let mut core = self.inner.core();
            if core.starting.is_some() {
                tracing::debug!("Start already in progress");
                return core.state.clone();
            }
            if !self.inner.apply(&mut core, SessionEvent::StartRequested) {
                tracing::debug!(state = %core.state, "Start ignored");
                return core.state.clone();
            }
            core.generation += 1;
            core.starting = Some(core.generation);
            core.debounce.reset();
            core.last_outcome = None;
            core.generation
        };
        let _guard = StartGuard {
            inner: &self.inner,
            generation,
        };

        let acquired = self.inner.controller.acquire(self.inner.facing).await;

        let mut core = self.inner.core();
        if core.generation != generation {
            // Stopped while waiting; `stop` already released whatever arrived.
            tracing::debug!("Start superseded before the camera settled");
            return core.state.clone();
        }
        core.starting = None;

        match acquired {
            Ok(_) => {
                self.inner.apply(&mut core, SessionEvent::CaptureGranted);
                self.launch_cascade(&mut core);
                core.state.clone()
            }
            Err(err) => {
                let outcome = ScanOutcome::rejected(err.reject_reason());
                self.inner
                    .apply(&mut core, SessionEvent::CaptureFailed(outcome));
                let state = core.state.clone();
                drop(core);
                self.inner.controller.release();
                state
            }
        }
    }

    /// Stops scanning and any in-flight verification, and releases the
    /// camera. Synchronous and idempotent; results that arrive afterwards
    /// are discarded.
    pub fn stop(&self) {
        let (run, flight) = {
            let mut core = self.inner.core();
            core.generation += 1;
            core.starting = None;
            core.debounce.reset();
            self.inner.apply(&mut core, SessionEvent::Stop);
            (core.run.take(), core.flight.take())
        };
        if let Some(flight) = flight {
            flight.task.abort();
        }
        drop(run);
        let released = self.inner.controller.release();
        tracing::debug!(released, "Session stopped");
    }

    /// Clears the last outcome. While scanning, relaunches the cascade on the
    /// held camera instead of reacquiring it.
    pub fn reset(&self) {
        let mut core = self.inner.core();
        core.last_outcome = None;
        core.debounce.reset();
        let was_scanning = core.state == SessionState::Scanning;
        if !self.inner.apply(&mut core, SessionEvent::Reset) {
            tracing::debug!(state = %core.state, "Reset ignored");
            return;
        }
        if was_scanning && self.inner.controller.is_active() {
            if tokio::runtime::Handle::try_current().is_err() {
                tracing::warn!("Reset outside a runtime; cascade not relaunched");
                return;
            }
            core.generation += 1;
            self.launch_cascade(&mut core);
        }
    }

    pub fn toggle_illumination(&self, on: bool) -> Result<(), CaptureError> {
        self.inner.controller.set_illumination(on)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decode entry points
    // ─────────────────────────────────────────────────────────────────────────

    /// Feeds a decode from a host-side scanner. Debounced like live decodes.
    /// Must be called within a tokio runtime; returns whether verification
    /// started.
    pub fn handle_decoded(&self, raw: String) -> bool {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!("Decode handed over outside a runtime; ignored");
            return false;
        }
        let mut core = self.inner.core();
        self.begin_flight(&mut core, raw, DecodeStrategy::External, true)
    }

    /// Decodes an uploaded image and, on success, verifies it. A failed image
    /// never stops a running camera; the failure is reported through
    /// `last_outcome` (or as `Terminal` when not scanning).
    pub async fn scan_image(&self, bytes: Vec<u8>) -> bool {
        let decoder = Arc::clone(&self.inner.still_decoder);
        let max_dimension = self.inner.image_max_dimension;
        let decoded = tokio::task::spawn_blocking(move || {
            decode_still_image(&bytes, decoder.as_ref(), max_dimension)
        })
        .await
        .unwrap_or_else(|err| Err(DecodeError::Unavailable(err.to_string())));

        let mut core = self.inner.core();
        match decoded {
            Ok(raw) => self.begin_flight(&mut core, raw, DecodeStrategy::StillImage, false),
            Err(err) => {
                tracing::info!(error = %err, "No QR code read from image");
                let outcome = ScanOutcome::rejected(err.reject_reason());
                match next_state(&core.state, SessionEvent::ImageFailed(outcome.clone())) {
                    Some(next) => self.inner.commit(&mut core, next),
                    None => core.last_outcome = Some(outcome),
                }
                false
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn launch_cascade(&self, core: &mut SessionCore) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = DecodeSink::new(core.generation, tx);
        core.run = Some(self.inner.cascade.launch(self.inner.controller.surface(), sink));
        tokio::spawn(drive_cascade(Arc::downgrade(&self.inner), rx));
    }

    fn on_cascade_event(&self, event: CascadeEvent) {
        let mut core = self.inner.core();
        let current = event.generation() == core.generation;
        match event {
            CascadeEvent::TracksAdopted { tracks, .. } => {
                let live = current && core.state.holds_capture();
                drop(core);
                if live {
                    self.inner.controller.adopt_tracks(tracks);
                } else {
                    for track in tracks {
                        track.set_enabled(false);
                        track.stop();
                    }
                }
            }
            CascadeEvent::Decoded { raw, strategy, .. } => {
                if !current || core.state != SessionState::Scanning {
                    tracing::debug!(%strategy, state = %core.state, "Discarding stale decode");
                    return;
                }
                self.begin_flight(&mut core, raw, strategy, true);
            }
        }
    }

    /// Moves to `Decoding`, tears down live capture, then spawns the
    /// verify/submit flight. The camera is always released before any
    /// network call.
    fn begin_flight(
        &self,
        core: &mut SessionCore,
        raw: String,
        strategy: DecodeStrategy,
        debounced: bool,
    ) -> bool {
        if raw.trim().is_empty() {
            return false;
        }
        let event = SessionEvent::Decoded {
            candidate: raw.clone(),
        };
        let Some(next) = next_state(&core.state, event) else {
            tracing::debug!(%strategy, state = %core.state, "Decode ignored while busy");
            return false;
        };
        if debounced && !core.debounce.admit(Instant::now()) {
            tracing::debug!(%strategy, "Decode debounced");
            return false;
        }

        self.inner.commit(core, next);
        core.generation += 1;
        if let Some(mut run) = core.run.take() {
            run.shutdown();
        }
        let released = self.inner.controller.release();

        core.next_flight += 1;
        let id = core.next_flight;
        tracing::info!(%strategy, len = raw.len(), released, "QR decoded; verifying");

        let session = self.clone();
        let task = tokio::spawn(async move { session.run_flight(id, raw).await });
        core.flight = Some(Flight {
            id,
            task: task.abort_handle(),
        });
        true
    }

    async fn run_flight(self, id: u64, raw: String) {
        if let Some(outcome) = self.process(id, &raw).await {
            self.finish(id, outcome);
        }
    }

    /// `None` when the flight was superseded part way.
    async fn process(&self, id: u64, raw: &str) -> Option<ScanOutcome> {
        let payload = match payload::normalize(raw) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::info!(error = %err, "QR payload rejected");
                return Some(ScanOutcome::rejected(RejectReason::InvalidPayload));
            }
        };
        if !self.advance(id, SessionEvent::PayloadAccepted) {
            return None;
        }

        let info = match self.inner.verifier.verify(&payload).await {
            Ok(Verification::Match(info)) => info,
            Ok(Verification::Mismatch) => {
                return Some(ScanOutcome::rejected(RejectReason::TokenMismatch))
            }
            Err(err) => return Some(verify_failure(&err)),
        };
        if !self.advance(id, SessionEvent::TokenVerified) {
            return None;
        }

        Some(self.inner.submitter.submit(&payload, &info).await)
    }

    fn advance(&self, id: u64, event: SessionEvent) -> bool {
        let mut core = self.inner.core();
        core.flight_id() == Some(id) && self.inner.apply(&mut core, event)
    }

    fn finish(&self, id: u64, outcome: ScanOutcome) {
        let mut core = self.inner.core();
        if core.flight_id() != Some(id) {
            tracing::debug!(flight = id, "Discarding outcome of a cancelled scan");
            return;
        }
        core.flight = None;
        tracing::info!(
            success = outcome.is_success(),
            reason = ?outcome.reject_reason(),
            message = outcome.message(),
            "Scan finished"
        );
        self.inner.apply(&mut core, SessionEvent::Finished(outcome));
    }
}

async fn drive_cascade(session: Weak<SessionInner>, mut rx: mpsc::UnboundedReceiver<CascadeEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        ScanSession { inner }.on_cascade_event(event);
    }
}

/// Maps a failed token lookup onto the terminal outcome.
fn verify_failure(err: &VerifyError) -> ScanOutcome {
    match err {
        VerifyError::ActivityHasNoToken => ScanOutcome::rejected(RejectReason::NoActiveToken),
        VerifyError::Lookup(ApiError::Status {
            status, message, ..
        }) => ScanOutcome::rejected_with(
            RejectReason::ServerRejected { status: *status },
            message.as_deref(),
        ),
        VerifyError::Lookup(ApiError::Timeout) => ScanOutcome::rejected(RejectReason::Timeout),
        VerifyError::Lookup(ApiError::Network(_)) => ScanOutcome::rejected(RejectReason::Network),
        VerifyError::Lookup(ApiError::Decode(_)) => {
            ScanOutcome::rejected(RejectReason::MalformedResponse)
        }
    }
}
