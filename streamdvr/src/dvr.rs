//! Top-level orchestration of all sites.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::capture::{ProcessRecorder, ScriptArgs};
use crate::config::DvrConfig;
use crate::pipeline::{PostProcessQueue, PostProcessWorker, PostProcessor};
use crate::site::{CycleReport, ScriptProbe, Site, SiteDeps, SiteSettings};
use crate::utils::fs;

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long killed recorders get to go away.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Owns every site, the shared post-process queue and its worker.
pub struct Dvr {
    config: Mutex<DvrConfig>,
    /// Where the streamer lists are saved back to; `None` keeps them in memory.
    config_path: Option<PathBuf>,
    sites: Vec<Arc<Site>>,
    queue: Arc<PostProcessQueue>,
    processor: Arc<dyn PostProcessor>,
    /// Stops polling and new captures.
    cancel: CancellationToken,
    /// Stops the post-process worker once recordings are safe.
    worker_stop: CancellationToken,
    tasks: Mutex<Tasks>,
}

#[derive(Default)]
struct Tasks {
    worker: Option<JoinHandle<()>>,
    refreshers: Vec<JoinHandle<()>>,
}

impl Dvr {
    /// Build a DVR with script probes and process recorders for every site.
    pub fn new(
        config: DvrConfig,
        config_path: Option<PathBuf>,
        processor: Arc<dyn PostProcessor>,
    ) -> Result<Self> {
        Self::with_deps(config, config_path, processor, |settings, queue| SiteDeps {
            probe: Arc::new(ScriptProbe::new(&settings.site, &settings.proxy)),
            args: Arc::new(ScriptArgs),
            recorder: Arc::new(ProcessRecorder::new()),
            queue,
        })
    }

    /// Build a DVR, asking `deps` for the collaborators of each site.
    pub fn with_deps(
        config: DvrConfig,
        config_path: Option<PathBuf>,
        processor: Arc<dyn PostProcessor>,
        deps: impl Fn(&SiteSettings, Arc<PostProcessQueue>) -> SiteDeps,
    ) -> Result<Self> {
        fs::ensure_dir_all_sync_with_op(
            "creating capture directory",
            &config.recording.capture_directory,
        )?;

        let queue = Arc::new(PostProcessQueue::new());
        let cancel = CancellationToken::new();

        let sites = config
            .sites
            .iter()
            .map(|site| {
                let settings = SiteSettings {
                    site: site.clone(),
                    recording: config.recording.clone(),
                    proxy: config.proxy.clone(),
                    debug: config.debug.clone(),
                };
                let site_deps = deps(&settings, queue.clone());
                Arc::new(Site::new(settings, site_deps, cancel.clone()))
            })
            .collect();

        Ok(Self {
            config: Mutex::new(config),
            config_path,
            sites,
            queue,
            processor,
            cancel,
            worker_stop: CancellationToken::new(),
            tasks: Mutex::new(Tasks::default()),
        })
    }

    pub fn sites(&self) -> &[Arc<Site>] {
        &self.sites
    }

    pub fn site(&self, name: &str) -> Option<&Arc<Site>> {
        self.sites.iter().find(|s| s.name() == name)
    }

    pub fn queue(&self) -> &Arc<PostProcessQueue> {
        &self.queue
    }

    /// Token that stops the DVR when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the post-process worker and the per-site refresh loops.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.worker.is_some() {
            return;
        }

        let worker = PostProcessWorker::new(self.queue.clone(), self.processor.clone());
        tasks.worker = Some(tokio::spawn(worker.run(self.worker_stop.clone())));
        tasks.refreshers = self
            .sites
            .iter()
            .map(|site| tokio::spawn(site.clone().run_refreshes()))
            .collect();
    }

    /// Poll until cancelled, then shut down.
    pub async fn run(&self) {
        self.start();
        let interval = Duration::from_secs(self.config.lock().poll_interval_secs);
        info!(sites = self.sites.len(), "StreamDVR started");

        loop {
            self.cycle().await;
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.shutdown().await;
    }

    /// One round over every site: apply update files, then poll.
    pub async fn cycle(&self) -> Vec<CycleReport> {
        let mut dirty = false;
        for site in &self.sites {
            for add in [true, false] {
                match site.process_updates(add).await {
                    Ok(changed) => dirty |= changed,
                    Err(e) => error!(site = %site.name(), "{}", e),
                }
            }
        }
        if dirty && let Err(e) = self.persist_config().await {
            error!("{}", e);
        }

        let mut reports = Vec::with_capacity(self.sites.len());
        for site in &self.sites {
            reports.push(site.get_streamers().await);
        }
        reports
    }

    /// Write every site's persisted streamer list back to the config file.
    pub async fn persist_config(&self) -> Result<()> {
        let snapshot = {
            let mut config = self.config.lock();
            for site in &self.sites {
                config.set_site_streamers(site.name(), site.persisted_streamers());
            }
            config.clone()
        };

        match &self.config_path {
            Some(path) => {
                debug!(path = %path.display(), "Rewriting config");
                snapshot.save(path).await
            }
            None => Ok(()),
        }
    }

    /// Suspend or resume recording on every site.
    pub fn pause_all(&self, on: bool) {
        info!("{} all streamers", if on { "Pausing" } else { "Resuming" });
        for site in &self.sites {
            site.pause_all(on);
        }
    }

    pub fn captures_in_progress(&self) -> usize {
        self.sites.iter().map(|s| s.captures_in_progress()).sum()
    }

    /// Stop polling, halt every recorder and let post-processing finish.
    ///
    /// Recorders get `shutdown_grace_secs` to exit and are killed after
    /// that. Recordings they leave behind are post-processed before the
    /// worker stops.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let halted: usize = self.sites.iter().map(|s| s.halt_all()).sum();
        info!(halted, "Shutting down, waiting for captures to finish");

        let grace = Duration::from_secs(self.config.lock().shutdown_grace_secs);
        let remaining = self.wait_for_captures(grace).await;
        if remaining > 0 {
            let killed: usize = self.sites.iter().map(|s| s.capture().kill_all()).sum();
            warn!(remaining, killed, "Captures still running after shutdown grace period");
            let remaining = self.wait_for_captures(KILL_GRACE).await;
            if remaining > 0 {
                warn!(remaining, "Captures still held after killing recorders");
            }
        }

        self.worker_stop.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        if let Some(worker) = tasks.worker
            && let Err(e) = worker.await
        {
            error!("Post-process worker failed: {}", e);
        }
        for refresher in tasks.refreshers {
            refresher.abort();
        }
        info!("StreamDVR stopped");
    }

    /// Wait up to `timeout` for every capture to be released. Returns how
    /// many are left.
    async fn wait_for_captures(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = self.captures_in_progress();
            if remaining == 0 || Instant::now() >= deadline {
                return remaining;
            }
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
    }
}
