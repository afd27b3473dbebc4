//! Maps session events to state transitions.
//! `None` means the event does not apply in the current state and is dropped.

use crate::types::{ScanOutcome, SessionState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StartRequested,
    CaptureGranted,
    CaptureFailed(ScanOutcome),
    /// A decode won the cascade (or arrived from a still image or the host).
    Decoded { candidate: String },
    PayloadAccepted,
    TokenVerified,
    Finished(ScanOutcome),
    /// A still image yielded nothing usable.
    ImageFailed(ScanOutcome),
    Reset,
    Stop,
}

pub fn next_state(current: &SessionState, event: SessionEvent) -> Option<SessionState> {
    use SessionState::*;

    match (current, event) {
        (_, SessionEvent::Stop) => Some(Idle),

        (Idle | Terminal { .. }, SessionEvent::StartRequested) => Some(Starting),
        (Starting, SessionEvent::CaptureGranted) => Some(Scanning),
        (Starting, SessionEvent::CaptureFailed(outcome)) => Some(Terminal { outcome }),

        (Idle | Scanning | Terminal { .. }, SessionEvent::Decoded { candidate }) => {
            Some(Decoding { candidate })
        }
        (Decoding { .. }, SessionEvent::PayloadAccepted) => Some(Verifying),
        (Verifying, SessionEvent::TokenVerified) => Some(Submitting),
        (Decoding { .. } | Verifying | Submitting, SessionEvent::Finished(outcome)) => {
            Some(Terminal { outcome })
        }

        // A bad upload never interrupts a live camera.
        (Idle | Terminal { .. }, SessionEvent::ImageFailed(outcome)) => Some(Terminal { outcome }),

        (Idle | Terminal { .. }, SessionEvent::Reset) => Some(Idle),
        (Scanning, SessionEvent::Reset) => Some(Scanning),

        _ => None,
    }
}
