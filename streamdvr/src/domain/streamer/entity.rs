//! Streamer record.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::StreamerState;
use crate::capture::CaptureHandle;

/// Identity of a streamer: the stable key plus the name shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamerRef {
    pub uid: String,
    pub name: String,
}

impl StreamerRef {
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
        }
    }

    /// Identity for sites where the name is the key.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uid: name.clone(),
            name,
        }
    }
}

/// Identity of one capture, unique within a site.
///
/// Claimed on the record before the recorder is spawned, so a recorder that
/// outlives its record can never act on a later one with the same uid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureId(u64);

impl CaptureId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for CaptureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A tracked streamer.
#[derive(Debug, Clone)]
pub struct Streamer {
    /// Unique key, stable across renames.
    pub uid: String,
    /// Display name.
    pub name: String,
    pub state: StreamerState,
    /// Paused streamers are polled but never captured.
    pub paused: bool,
    /// Added for this session only.
    pub is_temporary: bool,
    /// Live recorder, or the exited one whose output awaits post-processing.
    pub capture: Option<Arc<dyn CaptureHandle>>,
    /// Capture slot owner. Set while a recorder is starting and for as long
    /// as `capture` is held.
    pub capture_id: Option<CaptureId>,
    /// Recording filename (with extension) inside the capture directory.
    pub filename: String,
    /// Size in whole MB seen by the previous monitor pass.
    pub last_size_mb: u64,
    /// Consecutive monitor passes without growth.
    pub stuck_count: u32,
    /// Set while the post-processor works on the recording.
    pub post_processing: bool,
}

impl Streamer {
    pub fn new(id: &StreamerRef, is_temporary: bool) -> Self {
        Self {
            uid: id.uid.clone(),
            name: id.name.clone(),
            state: StreamerState::Offline,
            paused: false,
            is_temporary,
            capture: None,
            capture_id: None,
            filename: String::new(),
            last_size_mb: 0,
            stuck_count: 0,
            post_processing: false,
        }
    }

    pub fn identity(&self) -> StreamerRef {
        StreamerRef::new(self.uid.clone(), self.name.clone())
    }

    pub fn has_capture(&self) -> bool {
        self.capture.is_some()
    }

    /// Whether the capture slot is taken, by a running recorder or one that
    /// is still starting.
    pub fn is_capture_claimed(&self) -> bool {
        self.capture_id.is_some()
    }

    /// Whether `id` is the capture this record currently owns.
    pub fn owns_capture(&self, id: CaptureId) -> bool {
        self.capture_id == Some(id)
    }

    /// Whether post-processing owns the capture, which shields it from halts.
    pub fn is_post_processing(&self) -> bool {
        self.post_processing || self.state == StreamerState::PostProcessing
    }

    /// Whether a running recorder may be halted.
    pub fn is_haltable(&self) -> bool {
        self.capture.is_some() && !self.is_post_processing()
    }

    /// Drop the capture handle and forget the recording.
    pub fn clear_capture(&mut self) {
        self.capture = None;
        self.capture_id = None;
        self.filename.clear();
        self.last_size_mb = 0;
        self.stuck_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_streamer_is_idle() {
        let s = Streamer::new(&StreamerRef::new("42", "alice"), true);
        assert_eq!(s.uid, "42");
        assert_eq!(s.name, "alice");
        assert_eq!(s.state, StreamerState::Offline);
        assert!(s.is_temporary);
        assert!(!s.paused);
        assert!(!s.has_capture());
        assert!(!s.is_haltable());
        assert!(!s.is_capture_claimed());
        assert_eq!(s.stuck_count, 0);
    }

    #[test]
    fn test_clear_capture_releases_claim() {
        let mut s = Streamer::new(&StreamerRef::named("alice"), false);
        s.capture_id = Some(CaptureId::new(7));
        s.filename = "alice_1.ts".to_string();
        assert!(s.owns_capture(CaptureId::new(7)));
        assert!(!s.owns_capture(CaptureId::new(8)));

        s.clear_capture();
        assert!(!s.is_capture_claimed());
        assert!(s.filename.is_empty());
    }

    #[test]
    fn test_named_identity() {
        let id = StreamerRef::named("bob");
        assert_eq!(id.uid, "bob");
        assert_eq!(id.name, "bob");
    }

    #[test]
    fn test_post_processing_state_shields_capture() {
        let mut s = Streamer::new(&StreamerRef::named("alice"), false);
        s.state = StreamerState::PostProcessing;
        assert!(s.is_post_processing());
        s.state = StreamerState::Offline;
        s.post_processing = true;
        assert!(s.is_post_processing());
    }
}
