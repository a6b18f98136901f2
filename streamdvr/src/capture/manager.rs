//! Capture process manager.
//!
//! Owns the spawn / halt / exit-handling side of every capture for one site.
//! Process completion is observed asynchronously: [`CaptureManager::start`]
//! returns as soon as the recorder is running, and the exit is handled by a
//! background task that resolves the recording and asks for a refresh.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::handle::ProcessSignal;
use super::recorder::{Recorder, SpawnRequest};
use crate::domain::{CaptureId, Streamer, StreamerRef, StreamerState};
use crate::pipeline::{PostProcessEntry, PostProcessQueue, ProcessingTarget};
use crate::streamer::StreamerRegistry;
use crate::utils::filename::with_extension;
use crate::utils::fs::{self, BYTES_PER_MB};
use crate::{Error, Result};

/// Settings the capture manager needs from the recording config.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub capture_dir: PathBuf,
    /// Recordings smaller than this many MB are discarded.
    pub min_size_mb: u64,
}

/// How a finished capture was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// No recording was found.
    Missing,
    /// The recording was below the minimum size and deleted.
    Discarded { size_bytes: u64 },
    /// The recording was queued for post-processing.
    Queued { size_bytes: u64, drain_signaled: bool },
}

/// Manages recorder processes for the streamers of one site.
pub struct CaptureManager {
    site: String,
    settings: CaptureSettings,
    registry: Arc<StreamerRegistry>,
    recorder: Arc<dyn Recorder>,
    queue: Arc<PostProcessQueue>,
    refresh_tx: mpsc::UnboundedSender<String>,
    next_capture: AtomicU64,
}

impl CaptureManager {
    pub fn new(
        site: impl Into<String>,
        settings: CaptureSettings,
        registry: Arc<StreamerRegistry>,
        recorder: Arc<dyn Recorder>,
        queue: Arc<PostProcessQueue>,
        refresh_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            site: site.into(),
            settings,
            registry,
            recorder,
            queue,
            refresh_tx,
            next_capture: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<StreamerRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Path of a recording inside the capture directory.
    pub fn recording_path(&self, filename: &str) -> PathBuf {
        self.settings.capture_dir.join(filename)
    }

    /// Claim the capture slot of `uid` for a new recorder.
    ///
    /// Refused for unknown streamers and for streamers whose slot is taken
    /// (recorder starting, running, or awaiting post-processing). The check
    /// and the claim happen under one registry write lock.
    pub fn setup_capture(&self, uid: &str) -> Option<CaptureId> {
        let id = CaptureId::new(self.next_capture.fetch_add(1, Ordering::Relaxed));
        let claimed = self.registry.update(uid, |s| {
            if s.is_capture_claimed() {
                return Err(s.name.clone());
            }
            s.capture_id = Some(id);
            Ok(())
        })?;

        match claimed {
            Ok(()) => Some(id),
            Err(name) => {
                debug!(site = %self.site, streamer = %name, "Already capturing");
                None
            }
        }
    }

    /// Spawn a recorder into the slot claimed by [`setup_capture`](Self::setup_capture).
    ///
    /// `filename` is the recording name without extension. On failure the
    /// claim is given back, nothing else on the streamer changes and the
    /// error is returned.
    pub fn start(
        self: &Arc<Self>,
        request: &SpawnRequest,
        streamer: &StreamerRef,
        filename: &str,
        id: CaptureId,
    ) -> Result<()> {
        debug!(site = %self.site, "Starting recording: {}", request.command_line());

        let spawned = match self.recorder.spawn(request) {
            Ok(spawned) => spawned,
            Err(e) => {
                self.registry.update(&streamer.uid, |s| {
                    if s.owns_capture(id) && s.capture.is_none() {
                        s.capture_id = None;
                    }
                });
                error!(site = %self.site, streamer = %streamer.name, "{}", e);
                return Err(e);
            }
        };

        let full_name = with_extension(filename);
        let handle = spawned.handle.clone();
        let attached = self
            .registry
            .update(&streamer.uid, |s| {
                if !s.owns_capture(id) {
                    return false;
                }
                s.capture = Some(handle.clone());
                s.filename = full_name.clone();
                s.state = StreamerState::Capturing;
                s.last_size_mb = 0;
                s.stuck_count = 0;
                s.post_processing = false;
                true
            })
            .unwrap_or(false);

        if attached {
            info!(
                site = %self.site,
                streamer = %streamer.name,
                pid = handle.pid(),
                "Recording started: {}",
                full_name
            );
        } else {
            // Removed (and maybe re-added) while the recorder was starting.
            warn!(
                site = %self.site,
                streamer = %streamer.name,
                capture = %id,
                "Streamer removed before recording started, stopping recorder"
            );
            if let Err(e) = handle.terminate(ProcessSignal::Interrupt) {
                error!(site = %self.site, streamer = %streamer.name, "{}", e);
            }
        }

        let manager = Arc::clone(self);
        let streamer = streamer.clone();
        let filename = filename.to_string();
        tokio::spawn(async move {
            let exit_code = spawned.exit.await.ok().flatten();
            debug!(
                site = %manager.site,
                streamer = %streamer.name,
                capture = %id,
                ?exit_code,
                "Recorder exited"
            );
            manager.on_exit(&streamer, &filename, id).await;
        });

        Ok(())
    }

    /// Resolve a finished capture.
    ///
    /// Missing output clears the capture; output below `min_size_mb` is
    /// deleted; anything else is queued for post-processing with the
    /// streamer held in [`StreamerState::PostProcessing`]. A refresh is
    /// requested in every case.
    ///
    /// Only the record that still owns `id` is updated. A streamer removed
    /// while capturing is detached: its recording is still resolved, but
    /// neither a missing record nor a newer capture under the same uid is
    /// touched.
    pub async fn on_exit(
        self: &Arc<Self>,
        streamer: &StreamerRef,
        filename: &str,
        id: CaptureId,
    ) -> ExitOutcome {
        let path = self.recording_path(&with_extension(filename));
        let outcome = self.resolve_output(streamer, filename, &path, id).await;
        self.refresh(&streamer.uid);
        outcome
    }

    async fn resolve_output(
        self: &Arc<Self>,
        streamer: &StreamerRef,
        filename: &str,
        path: &Path,
        id: CaptureId,
    ) -> ExitOutcome {
        let size_bytes = match fs::file_size(path).await {
            Ok(size) => size,
            Err(e) => {
                if e.is_not_found() {
                    let missing = Error::OutputMissing {
                        uid: streamer.uid.clone(),
                        path: path.to_path_buf(),
                    };
                    error!(site = %self.site, streamer = %streamer.name, "{}", missing);
                } else {
                    error!(site = %self.site, streamer = %streamer.name, "{}", e);
                }
                self.release(&streamer.uid, id);
                return ExitOutcome::Missing;
            }
        };

        let min_bytes = self.settings.min_size_mb.saturating_mul(BYTES_PER_MB);
        if size_bytes < min_bytes {
            info!(
                site = %self.site,
                streamer = %streamer.name,
                "Recording automatically deleted (size={:.2}MB < minSize={}MB)",
                size_bytes as f64 / BYTES_PER_MB as f64,
                self.settings.min_size_mb
            );
            if let Err(e) = tokio::fs::remove_file(path).await {
                error!(
                    site = %self.site,
                    streamer = %streamer.name,
                    "{}",
                    fs::io_error("deleting", path, e)
                );
            }
            self.release(&streamer.uid, id);
            return ExitOutcome::Discarded { size_bytes };
        }

        self.registry.update(&streamer.uid, |s| {
            if s.owns_capture(id) {
                s.state = StreamerState::PostProcessing;
            }
        });

        let target: Arc<dyn ProcessingTarget> = self.clone();
        let drain_signaled = self.queue.enqueue(PostProcessEntry {
            site: target,
            streamer: streamer.clone(),
            capture: id,
            filename: filename.to_string(),
        });

        ExitOutcome::Queued {
            size_bytes,
            drain_signaled,
        }
    }

    /// Drop the capture handle and return the streamer to Offline, if the
    /// record still owns `id`. Returns whether it did.
    fn release(&self, uid: &str, id: CaptureId) -> bool {
        let released = self
            .registry
            .update(uid, |s| {
                if !s.owns_capture(id) {
                    return false;
                }
                s.clear_capture();
                s.post_processing = false;
                s.state = StreamerState::Offline;
                true
            })
            .unwrap_or(false);

        if !released {
            debug!(site = %self.site, uid, capture = %id, "Capture is no longer tracked");
        }
        released
    }

    /// Interrupt the recorder of `uid`.
    ///
    /// A no-op without a live handle or while post-processing owns it.
    pub fn halt(&self, uid: &str) -> bool {
        self.registry
            .with(uid, |s| self.halt_streamer(s))
            .unwrap_or(false)
    }

    /// Interrupt the recorder held by `streamer`. Returns whether a signal was sent.
    pub fn halt_streamer(&self, streamer: &Streamer) -> bool {
        if !streamer.is_haltable() {
            return false;
        }
        let Some(handle) = &streamer.capture else {
            return false;
        };
        if handle.has_exited() {
            return false;
        }

        match handle.terminate(ProcessSignal::Interrupt) {
            Ok(()) => {
                debug!(
                    site = %self.site,
                    streamer = %streamer.name,
                    pid = handle.pid(),
                    "Sent {} to recorder",
                    ProcessSignal::Interrupt
                );
                true
            }
            Err(e) => {
                error!(site = %self.site, streamer = %streamer.name, "{}", e);
                false
            }
        }
    }

    /// Halt every capture of the site. Post-processing jobs are left alone.
    pub fn halt_all(&self) -> usize {
        self.registry
            .list()
            .iter()
            .filter(|s| self.halt_streamer(s))
            .count()
    }

    /// Kill every recorder that is still running.
    ///
    /// Last resort once recorders have ignored the interrupt for too long.
    pub fn kill_all(&self) -> usize {
        let mut killed = 0;
        for streamer in self.registry.list() {
            let Some(handle) = streamer.capture.as_ref().filter(|h| !h.has_exited()) else {
                continue;
            };
            warn!(
                site = %self.site,
                streamer = %streamer.name,
                pid = handle.pid(),
                "Recorder did not stop, sending {}",
                ProcessSignal::Kill
            );
            match handle.terminate(ProcessSignal::Kill) {
                Ok(()) => killed += 1,
                Err(e) => error!(site = %self.site, streamer = %streamer.name, "{}", e),
            }
        }
        killed
    }

    /// Number of streamers still holding a capture handle.
    pub fn captures_in_progress(&self) -> usize {
        self.registry.captures_in_progress()
    }

    /// Ask the site to re-check a streamer.
    pub fn refresh(&self, uid: &str) {
        // Closed only once the site is gone.
        let _ = self.refresh_tx.send(uid.to_string());
    }
}

impl ProcessingTarget for CaptureManager {
    fn site_name(&self) -> &str {
        &self.site
    }

    fn capture_dir(&self) -> &Path {
        &self.settings.capture_dir
    }

    fn mark_processing(&self, uid: &str, capture: CaptureId) {
        self.registry.update(uid, |s| {
            if s.owns_capture(capture) {
                s.post_processing = true;
                s.state = StreamerState::PostProcessing;
            }
        });
    }

    fn clear_processing(&self, uid: &str, capture: CaptureId) {
        if self.release(uid, capture) {
            self.refresh(uid);
        }
    }
}
