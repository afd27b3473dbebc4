//! Test doubles for the camera, decoders and HTTP API.
//!
//! Compiled for unit tests and behind the `test-helpers` feature so
//! integration tests and host apps can drive a full session without
//! hardware or a server. Every double can share an `EventLog`, which is how
//! tests assert cross-component ordering (device released before network).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{GrayImage, Luma};
use qr_scan_protocol::{QrData, ScanReceipt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::api::AttendanceApi;
use crate::capture::{
    CameraBackend, CaptureRequest, CaptureStream, MediaTrack, RenderSurface, TrackCapabilities,
};
use crate::decode::{
    ContinuousDecoder, DecodeLoop, DecodeSink, Frame, NativeDetector, QrDecoder,
};
use crate::error::{ApiError, CaptureError, DecodeError};
use crate::types::DecodeStrategy;

// ─────────────────────────────────────────────────────────────────────────────
// Event Log
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }

    /// Index of the first entry starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .position(|e| e.starts_with(prefix))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capture
// ─────────────────────────────────────────────────────────────────────────────

pub struct FakeTrack {
    id: String,
    log: EventLog,
    caps: TrackCapabilities,
    enabled: AtomicBool,
    torch: AtomicBool,
    focus_applied: AtomicBool,
    stops: AtomicUsize,
}

impl FakeTrack {
    pub fn new(id: &str, log: EventLog) -> Self {
        Self {
            id: id.to_string(),
            log,
            caps: TrackCapabilities::default(),
            enabled: AtomicBool::new(true),
            torch: AtomicBool::new(false),
            focus_applied: AtomicBool::new(false),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn with_torch(mut self) -> Self {
        self.caps.torch = true;
        self
    }

    pub fn with_focus(mut self) -> Self {
        self.caps.continuous_focus = true;
        self.caps.continuous_exposure = true;
        self
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn torch_on(&self) -> bool {
        self.torch.load(Ordering::SeqCst)
    }

    pub fn focus_applied(&self) -> bool {
        self.focus_applied.load(Ordering::SeqCst)
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn capabilities(&self) -> TrackCapabilities {
        self.caps
    }

    fn apply_continuous_focus(&self, exposure: bool) -> Result<(), CaptureError> {
        self.log.push(format!("{}.focus(exposure={})", self.id, exposure));
        self.focus_applied.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_torch(&self, on: bool) -> Result<(), CaptureError> {
        self.log.push(format!("{}.torch({})", self.id, on));
        self.torch.store(on, Ordering::SeqCst);
        Ok(())
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.log.push(format!("{}.stop", self.id));
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

type Shared<T> = Arc<Mutex<Vec<T>>>;

/// Camera that grants one fresh `FakeTrack` per open.
pub struct FakeCamera {
    log: EventLog,
    error: Option<CaptureError>,
    gate: Option<Arc<Semaphore>>,
    gate_first_only: bool,
    torch: bool,
    focus: bool,
    requests: Shared<CaptureRequest>,
    tracks: Shared<Arc<FakeTrack>>,
}

impl FakeCamera {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            error: None,
            gate: None,
            gate_first_only: false,
            torch: false,
            focus: false,
            requests: Arc::default(),
            tracks: Arc::default(),
        }
    }

    pub fn failing(log: EventLog, error: CaptureError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(log)
        }
    }

    /// Each open waits for a permit on the returned semaphore.
    pub fn gated(log: EventLog) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let camera = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::new(log)
        };
        (camera, gate)
    }

    /// Only the first open waits for a permit; later opens grant at once.
    pub fn gated_first(log: EventLog) -> (Self, Arc<Semaphore>) {
        let (mut camera, gate) = Self::gated(log);
        camera.gate_first_only = true;
        (camera, gate)
    }

    pub fn with_torch(mut self) -> Self {
        self.torch = true;
        self
    }

    pub fn with_focus(mut self) -> Self {
        self.focus = true;
        self
    }

    pub fn requests_handle(&self) -> Shared<CaptureRequest> {
        Arc::clone(&self.requests)
    }

    pub fn tracks_handle(&self) -> Shared<Arc<FakeTrack>> {
        Arc::clone(&self.tracks)
    }
}

#[async_trait]
impl CameraBackend for FakeCamera {
    async fn open(&self, request: &CaptureRequest) -> Result<CaptureStream, CaptureError> {
        self.log.push("camera.open");
        let first = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() == 1
        };
        if let Some(gate) = self.gate.as_ref().filter(|_| first || !self.gate_first_only) {
            gate.acquire()
                .await
                .map_err(|_| CaptureError::Platform("gate closed".to_string()))?
                .forget();
        }
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let mut tracks = self.tracks.lock().unwrap();
        let mut track = FakeTrack::new(&format!("video-{}", tracks.len()), self.log.clone());
        if self.torch {
            track = track.with_torch();
        }
        if self.focus {
            track = track.with_focus();
        }
        let track = Arc::new(track);
        tracks.push(Arc::clone(&track));
        Ok(CaptureStream::new(vec![track as Arc<dyn MediaTrack>]))
    }
}

/// Surface that serves whatever frame the test set.
pub struct FakeSurface {
    log: EventLog,
    attached: AtomicBool,
    frame: Mutex<Option<Frame>>,
}

impl FakeSurface {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            attached: AtomicBool::new(false),
            frame: Mutex::new(None),
        }
    }

    pub fn with_frame(self, frame: Frame) -> Self {
        *self.frame.lock().unwrap() = Some(frame);
        self
    }

    pub fn set_frame(&self, frame: Frame) {
        *self.frame.lock().unwrap() = Some(frame);
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }
}

impl RenderSurface for FakeSurface {
    fn attach(&self, tracks: &[Arc<dyn MediaTrack>]) {
        self.log.push("surface.attach");
        self.attached.store(!tracks.is_empty(), Ordering::SeqCst);
    }

    fn detach(&self) {
        self.log.push("surface.detach");
        self.attached.store(false, Ordering::SeqCst);
    }

    fn snapshot(&self) -> Option<Frame> {
        if !self.is_attached() {
            return None;
        }
        self.frame.lock().unwrap().clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoders
// ─────────────────────────────────────────────────────────────────────────────

type ImagePredicate = Box<dyn Fn(&GrayImage) -> bool + Send + Sync>;

/// Software decoder that "finds" `content` whenever the predicate holds, and
/// records the dimensions of every attempt.
pub struct PredicateDecoder {
    content: String,
    accept: ImagePredicate,
    attempts: Mutex<Vec<(u32, u32)>>,
}

impl PredicateDecoder {
    pub fn new<F>(content: &str, accept: F) -> Self
    where
        F: Fn(&GrayImage) -> bool + Send + Sync + 'static,
    {
        Self {
            content: content.to_string(),
            accept: Box::new(accept),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> Vec<(u32, u32)> {
        self.attempts.lock().unwrap().clone()
    }
}

impl QrDecoder for PredicateDecoder {
    fn decode(&self, image: &GrayImage) -> Option<String> {
        self.attempts.lock().unwrap().push(image.dimensions());
        (self.accept)(image).then(|| self.content.clone())
    }
}

/// Native detector whose every call blocks until the test resolves it.
pub struct ScriptedDetector {
    outcomes: Mutex<VecDeque<Result<Option<String>, DecodeError>>>,
    gate: Semaphore,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Lets one pending (or the next) detection finish with `payload`.
    pub fn resolve(&self, payload: Option<&str>) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Ok(payload.map(str::to_string)));
        self.gate.add_permits(1);
    }

    pub fn fail(&self) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(DecodeError::Unavailable("detector crashed".to_string())));
        self.gate.add_permits(1);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NativeDetector for ScriptedDetector {
    async fn detect(&self, _frame: Frame) -> Result<Option<String>, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let _active = ActiveGuard(&self.active);

        self.gate
            .acquire()
            .await
            .map_err(|_| DecodeError::Unavailable("gate closed".to_string()))?
            .forget();
        self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}

/// Continuous decoder driven by the test: `emit` and `rebind` push through
/// the sink of the most recent `start`.
#[derive(Default)]
pub struct FakeContinuousDecoder {
    sink: Mutex<Option<DecodeSink>>,
    cancel: Mutex<Option<CancellationToken>>,
    starts: AtomicUsize,
    unavailable: bool,
}

impl FakeContinuousDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn emit(&self, raw: &str) -> bool {
        self.sink
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|sink| sink.decoded(raw.to_string(), DecodeStrategy::ContinuousDecoder))
    }

    pub fn rebind(&self, tracks: Vec<Arc<dyn MediaTrack>>) -> bool {
        self.sink
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|sink| sink.adopt_tracks(tracks))
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Whether the most recent loop was stopped.
    pub fn stopped(&self) -> bool {
        self.cancel
            .lock()
            .unwrap()
            .as_ref()
            .map_or(true, CancellationToken::is_cancelled)
    }
}

impl ContinuousDecoder for FakeContinuousDecoder {
    fn start(
        &self,
        _surface: Arc<dyn RenderSurface>,
        sink: DecodeSink,
    ) -> Result<DecodeLoop, DecodeError> {
        if self.unavailable {
            return Err(DecodeError::Unavailable("no decoder library".to_string()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        *self.sink.lock().unwrap() = Some(sink);
        *self.cancel.lock().unwrap() = Some(cancel.clone());
        Ok(DecodeLoop::new(cancel, None))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory check-in API. Defaults to activity `A1` with token `tok123`
/// and an empty 2xx receipt.
pub struct FakeApi {
    qr_data: Mutex<Result<QrData, ApiError>>,
    receipt: Mutex<Result<ScanReceipt, ApiError>>,
    lookups: Mutex<Vec<String>>,
    submissions: Mutex<Vec<(String, String)>>,
    lookup_gate: Option<Arc<Semaphore>>,
    log: EventLog,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            qr_data: Mutex::new(Ok(QrData {
                activity_id: Some("A1".to_string()),
                activity_name: Some("Campus cleanup".to_string()),
                qr_token: Some("tok123".to_string()),
                ..QrData::default()
            })),
            receipt: Mutex::new(Ok(ScanReceipt::default())),
            lookups: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            lookup_gate: None,
            log: EventLog::default(),
        }
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_qr_data(self, data: QrData) -> Self {
        *self.qr_data.lock().unwrap() = Ok(data);
        self
    }

    pub fn with_lookup_error(self, err: ApiError) -> Self {
        *self.qr_data.lock().unwrap() = Err(err);
        self
    }

    pub fn with_receipt(self, receipt: ScanReceipt) -> Self {
        *self.receipt.lock().unwrap() = Ok(receipt);
        self
    }

    pub fn with_submit_error(self, err: ApiError) -> Self {
        *self.receipt.lock().unwrap() = Err(err);
        self
    }

    /// Each lookup waits for a permit on the returned semaphore.
    pub fn gated_lookup(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.lookup_gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<(String, String)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl AttendanceApi for FakeApi {
    async fn fetch_qr_info(&self, activity_id: &str) -> Result<QrData, ApiError> {
        self.log.push(format!("api.fetch_qr_info({})", activity_id));
        self.lookups.lock().unwrap().push(activity_id.to_string());
        if let Some(gate) = &self.lookup_gate {
            gate.acquire()
                .await
                .map_err(|_| ApiError::Network("gate closed".to_string()))?
                .forget();
        }
        self.qr_data.lock().unwrap().clone()
    }

    async fn submit_scan(&self, activity_id: &str, token: &str) -> Result<ScanReceipt, ApiError> {
        self.log.push(format!("api.submit_scan({})", activity_id));
        self.submissions
            .lock()
            .unwrap()
            .push((activity_id.to_string(), token.to_string()));
        self.receipt.lock().unwrap().clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Images
// ─────────────────────────────────────────────────────────────────────────────

/// Renders `content` as a QR code with a 4-module quiet zone.
pub fn render_qr(content: &str, scale: u32) -> GrayImage {
    let code = qrcode::QrCode::new(content.as_bytes()).expect("encodable QR content");
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let quiet = 4;
    let side = (modules + quiet * 2) * scale;

    GrayImage::from_fn(side, side, |x, y| {
        let mx = (x / scale) as i64 - quiet as i64;
        let my = (y / scale) as i64 - quiet as i64;
        let inside = (0..modules as i64).contains(&mx) && (0..modules as i64).contains(&my);
        let dark = inside
            && colors[(my as u32 * modules + mx as u32) as usize] == qrcode::Color::Dark;
        Luma([if dark { 0 } else { 255 }])
    })
}

pub fn encode_png(image: &GrayImage) -> Vec<u8> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageLuma8(image.clone())
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("png encode");
    bytes.into_inner()
}

/// A frame carrying a rendered QR code.
pub fn qr_frame(content: &str) -> Frame {
    Frame::from_luma(render_qr(content, 4))
}
