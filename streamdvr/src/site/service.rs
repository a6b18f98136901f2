//! Per-site polling and capture control.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::membership::MemberLists;
use super::probe::{ProbeStatus, StateProbe};
use crate::capture::{
    CaptureContext, CaptureManager, CaptureSettings, Recorder, SpawnArgsBuilder, SpawnRequest,
};
use crate::config::{DebugConfig, ProxyConfig, RecordingConfig, SiteConfig};
use crate::domain::{StreamerRef, StreamerState};
use crate::monitor::SizeMonitor;
use crate::pipeline::PostProcessQueue;
use crate::scheduler::{self, BatchReport};
use crate::streamer::StreamerRegistry;
use crate::utils::filename::{recording_filename, with_extension};
use crate::{Error, Result};

/// Recorder wrapper that wants the page URL rather than a stream locator.
pub const STREAMLINK_RECORDER: &str = "record_streamlink.sh";

/// Everything a site needs from the configuration.
#[derive(Debug, Clone, Default)]
pub struct SiteSettings {
    pub site: SiteConfig,
    pub recording: RecordingConfig,
    pub proxy: ProxyConfig,
    pub debug: DebugConfig,
}

/// External collaborators of a site.
pub struct SiteDeps {
    pub probe: Arc<dyn StateProbe>,
    pub args: Arc<dyn SpawnArgsBuilder>,
    pub recorder: Arc<dyn Recorder>,
    pub queue: Arc<PostProcessQueue>,
}

/// Outcome of one polling cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub checks: BatchReport,
    /// Reasons for every capture the size monitor halted.
    pub halted: Vec<Error>,
}

/// One streaming site: its streamers, their captures and the polling cycle.
pub struct Site {
    pub(super) settings: SiteSettings,
    pub(super) capture: Arc<CaptureManager>,
    pub(super) lists: Mutex<MemberLists>,
    monitor: SizeMonitor,
    probe: Arc<dyn StateProbe>,
    args: Arc<dyn SpawnArgsBuilder>,
    refresh_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    cancel: CancellationToken,
}

impl Site {
    /// Build a site and load its persisted streamers.
    ///
    /// A site with missing settings is still built; the problem is reported.
    pub fn new(settings: SiteSettings, deps: SiteDeps, cancel: CancellationToken) -> Self {
        if let Err(e) = settings.site.validate() {
            error!("{}", e);
        }

        let registry = Arc::new(StreamerRegistry::new());
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let capture = Arc::new(CaptureManager::new(
            settings.site.name.clone(),
            CaptureSettings {
                capture_dir: settings.recording.capture_directory.clone(),
                min_size_mb: settings.recording.min_size_mb,
            },
            registry,
            deps.recorder,
            deps.queue,
            refresh_tx,
        ));
        let monitor = SizeMonitor::new(
            settings.recording.capture_directory.clone(),
            settings.recording.max_size_mb,
        );

        let site = Self {
            capture,
            monitor,
            probe: deps.probe,
            args: deps.args,
            lists: Mutex::new(MemberLists::default()),
            refresh_rx: tokio::sync::Mutex::new(refresh_rx),
            cancel,
            settings,
        };

        let persisted: Vec<StreamerRef> = site
            .settings
            .site
            .streamers
            .iter()
            .map(StreamerRef::named)
            .collect();
        site.update_streamers(&persisted, true, true);
        info!(
            site = %site.name(),
            "{} streamer(s) in config",
            site.settings.site.streamers.len()
        );

        site
    }

    pub fn name(&self) -> &str {
        &self.settings.site.name
    }

    pub fn registry(&self) -> &Arc<StreamerRegistry> {
        self.capture.registry()
    }

    pub fn capture(&self) -> &Arc<CaptureManager> {
        &self.capture
    }

    pub fn is_exiting(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run one polling cycle: check every streamer in batches, then check
    /// the size of every running capture.
    pub async fn get_streamers(&self) -> CycleReport {
        if self.is_exiting() {
            debug!(site = %self.name(), "Skipping lookup while exit in progress");
            return CycleReport {
                checks: BatchReport {
                    cancelled: true,
                    ..Default::default()
                },
                halted: Vec::new(),
            };
        }

        let plan = scheduler::plan(&self.registry().uids(), self.settings.site.batch_size);
        let checks = scheduler::execute(&plan, &self.cancel, |uid| async move {
            self.check_streamer_state(&uid).await
        })
        .await;

        let halted = self.monitor.check(&self.capture).await;

        debug!(
            site = %self.name(),
            checked = checks.checked,
            failed = checks.failures.len(),
            halted = halted.len(),
            "Polling cycle finished"
        );
        CycleReport { checks, halted }
    }

    /// Probe one streamer and act on the result.
    ///
    /// A probe failure counts as offline for this cycle and is returned after
    /// the registry has been updated.
    pub async fn check_streamer_state(&self, uid: &str) -> Result<()> {
        if self.is_exiting() {
            debug!(site = %self.name(), uid, "Skipping status check while exit in progress");
            return Ok(());
        }

        let Some(id) = self.registry().with(uid, |s| s.identity()) else {
            debug!(site = %self.name(), uid, "Streamer no longer tracked, skipping check");
            return Ok(());
        };

        let (status, failure) = match self.probe.check(&id).await {
            Ok(status) => (status, None),
            Err(e) => (ProbeStatus::offline(), Some(e)),
        };

        let Some((prev, state, haltable, paused)) = self.registry().update(uid, |s| {
            let prev = s.state;
            if !s.is_post_processing() {
                s.state = match (status.online, s.has_capture()) {
                    (false, _) => StreamerState::Offline,
                    (true, false) => StreamerState::Streaming,
                    (true, true) => StreamerState::Capturing,
                };
            }
            (prev, s.state, s.is_haltable(), s.paused)
        }) else {
            debug!(site = %self.name(), streamer = %id.name, "Removed during status check");
            return Ok(());
        };

        if state != prev {
            info!(
                site = %self.name(),
                streamer = %id.name,
                from = %prev,
                to = %state,
                "{} is {}",
                id.name,
                if status.online { "streaming" } else { "offline" }
            );
        }

        if !status.online && haltable {
            // Recorders do not always exit when the broadcast ends.
            debug!(
                site = %self.name(),
                streamer = %id.name,
                "No longer broadcasting, terminating capture"
            );
            self.capture.halt(uid);
        }

        if let Some(e) = failure {
            error!(site = %self.name(), streamer = %id.name, "{}", e);
            return Err(e);
        }

        if status.online {
            if paused {
                debug!(site = %self.name(), streamer = %id.name, "Paused, recording not started");
            } else {
                self.start_capture(&id, &status.locator)?;
            }
        }

        Ok(())
    }

    /// Start recording an online streamer unless it is already captured.
    pub fn start_capture(&self, id: &StreamerRef, locator: &str) -> Result<()> {
        if self.is_exiting() {
            return Ok(());
        }
        let Some(capture) = self.capture.setup_capture(&id.uid) else {
            return Ok(());
        };

        let (request, filename) = self.spawn_request(id, locator);
        self.capture.start(&request, id, &filename, capture)
    }

    /// Build the recorder invocation and the recording filename stem.
    fn spawn_request(&self, id: &StreamerRef, locator: &str) -> (SpawnRequest, String) {
        let site = &self.settings.site;
        let recording = &self.settings.recording;

        let site_part = recording.include_site_in_file.then(|| site.list_name());
        let filename = recording_filename(
            &id.name,
            site_part.as_deref(),
            &recording.date_format,
            Local::now(),
        );
        let output_path = recording.capture_directory.join(with_extension(&filename));

        let page_url;
        let source = if self.uses_page_url() {
            page_url = format!("{}{}", site.site_url.as_deref().unwrap_or_default(), id.name);
            page_url.as_str()
        } else {
            locator
        };

        let args = self.args.build(&CaptureContext {
            output_path: &output_path,
            source,
            proxy: &self.settings.proxy,
            debug_recorder: self.settings.debug.recorder,
            site,
            extra: &[],
        });

        let log_file = self
            .settings
            .debug
            .recorder
            .then(|| PathBuf::from(format!("./{}.log", filename)));

        (
            SpawnRequest {
                uid: id.uid.clone(),
                program: site.recorder.clone(),
                args,
                log_file,
            },
            filename,
        )
    }

    fn uses_page_url(&self) -> bool {
        self.settings
            .site
            .recorder
            .file_name()
            .is_some_and(|f| f == STREAMLINK_RECORDER)
    }

    /// Re-check streamers whose refresh was requested.
    ///
    /// Runs until the site is cancelled.
    pub async fn run_refreshes(self: Arc<Self>) {
        let mut rx = self.refresh_rx.lock().await;
        loop {
            let uid = tokio::select! {
                _ = self.cancel.cancelled() => break,
                uid = rx.recv() => match uid {
                    Some(uid) => uid,
                    None => break,
                },
            };
            self.refresh(&uid).await;
        }
        debug!(site = %self.name(), "Refresh loop stopped");
    }

    /// Handle every refresh queued so far. Returns how many were handled.
    pub async fn process_pending_refreshes(&self) -> usize {
        let mut handled = 0;
        loop {
            let next = self.refresh_rx.lock().await.try_recv();
            let Ok(uid) = next else {
                return handled;
            };
            self.refresh(&uid).await;
            handled += 1;
        }
    }

    #[cfg(test)]
    pub(crate) async fn next_refresh(&self) -> Option<String> {
        self.refresh_rx.lock().await.recv().await
    }

    async fn refresh(&self, uid: &str) {
        if self.is_exiting() || !self.registry().contains(uid) {
            return;
        }
        if let Err(e) = self.check_streamer_state(uid).await {
            warn!(site = %self.name(), uid, "Refresh failed: {}", e);
        }
    }

    /// Halt every running capture. Post-processing jobs are left alone.
    pub fn halt_all(&self) -> usize {
        self.capture.halt_all()
    }

    pub fn captures_in_progress(&self) -> usize {
        self.capture.captures_in_progress()
    }
}
