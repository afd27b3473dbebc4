//! Collapses bursts of decodes into one event.

use std::time::Duration;

use tokio::time::Instant;

/// Admits a decode unless one was admitted less than `window` ago.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_admitted: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_admitted: None,
        }
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_admitted {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last_admitted = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_admitted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_window_is_one_event() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        assert!(debouncer.admit(start));
        assert!(!debouncer.admit(start + Duration::from_millis(100)));
        assert!(!debouncer.admit(start + Duration::from_millis(299)));
    }

    #[test]
    fn test_outside_window_is_a_new_event() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        assert!(debouncer.admit(start));
        assert!(debouncer.admit(start + Duration::from_millis(500)));
    }

    #[test]
    fn test_suppressed_decodes_do_not_extend_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        assert!(debouncer.admit(start));
        assert!(!debouncer.admit(start + Duration::from_millis(200)));
        assert!(debouncer.admit(start + Duration::from_millis(300)));
    }

    #[test]
    fn test_reset_rearms() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        assert!(debouncer.admit(start));
        debouncer.reset();
        assert!(debouncer.admit(start));
    }
}
