//! "Attendance updated" signal.
//!
//! Two channels: an in-process broadcast for live listeners, and a marker
//! file holding the epoch-millisecond time of the last check-in for
//! listeners that can only poll.

use std::path::{Path, PathBuf};

use chrono::Utc;
use fs_err as fs;
use tokio::sync::broadcast;

use crate::error::{Result, ScanError};
use crate::types::AttendanceUpdated;

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct AttendanceSignal {
    sender: broadcast::Sender<AttendanceUpdated>,
    marker: Option<PathBuf>,
}

impl Default for AttendanceSignal {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AttendanceSignal {
    /// `marker` is where the last-check-in time is persisted; `None` keeps
    /// the signal in-process only.
    pub fn new(marker: Option<PathBuf>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender, marker }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AttendanceUpdated> {
        self.sender.subscribe()
    }

    pub fn marker_path(&self) -> Option<&Path> {
        self.marker.as_deref()
    }

    /// Broadcasts the update and refreshes the marker. Marker failures are
    /// logged, never surfaced: the check-in itself already succeeded.
    pub fn emit(&self, activity_id: &str) -> AttendanceUpdated {
        let event = AttendanceUpdated {
            activity_id: activity_id.to_string(),
            at_millis: Utc::now().timestamp_millis(),
        };

        // No receivers is fine.
        let _ = self.sender.send(event.clone());

        if let Some(path) = &self.marker {
            if let Err(err) = write_marker(path, event.at_millis) {
                tracing::warn!(error = %err, path = %path.display(), "Failed to write attendance marker");
            }
        }

        tracing::debug!(activity_id = %event.activity_id, "Attendance updated signal emitted");
        event
    }
}

fn write_marker(path: &Path, at_millis: i64) -> Result<()> {
    let io_err = |context: &str, source| ScanError::Io {
        context: format!("{} {}", context, path.display()),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err("creating marker dir for", e))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, at_millis.to_string()).map_err(|e| io_err("writing marker", e))?;
    fs::rename(&tmp_path, path).map_err(|e| io_err("committing marker", e))?;
    Ok(())
}

/// Reads the last check-in time. A missing or garbled marker reads as `None`.
pub fn read_marker(path: &Path) -> Result<Option<i64>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ScanError::Io {
                context: format!("reading marker {}", path.display()),
                source,
            })
        }
    };
    Ok(content.trim().parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_broadcasts_and_writes_marker() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let marker = temp_dir.path().join("nested").join("ATTENDANCE_UPDATED_AT");
        let signal = AttendanceSignal::new(Some(marker.clone()));
        let mut rx = signal.subscribe();

        let event = signal.emit("A1");

        assert_eq!(rx.try_recv().expect("event"), event);
        assert_eq!(read_marker(&marker).expect("read"), Some(event.at_millis));
        assert!(!marker.with_extension("tmp").exists());
    }

    #[test]
    fn test_emit_without_listeners_or_marker() {
        let signal = AttendanceSignal::default();
        let event = signal.emit("A2");
        assert_eq!(event.activity_id, "A2");
        assert!(signal.marker_path().is_none());
    }

    #[test]
    fn test_read_marker_missing_or_garbled() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("marker");
        assert_eq!(read_marker(&path).expect("read"), None);
        fs::write(&path, "yesterday").expect("write");
        assert_eq!(read_marker(&path).expect("read"), None);
        fs::write(&path, "1718000000000\n").expect("write");
        assert_eq!(read_marker(&path).expect("read"), Some(1_718_000_000_000));
    }
}
