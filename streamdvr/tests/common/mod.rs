#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use streamdvr::capture::{
    CaptureHandle, ProcessSignal, Recorder, ScriptArgs, SpawnRequest, SpawnedCapture,
};
use streamdvr::config::{RecordingConfig, SiteConfig};
use streamdvr::domain::StreamerRef;
use streamdvr::pipeline::{PostProcessEntry, PostProcessQueue, PostProcessor};
use streamdvr::site::{ProbeStatus, Site, SiteDeps, SiteSettings, StateProbe};
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub const MB: u64 = 1_048_576;

/// Recorder process stand-in. Interrupting it writes the recording and exits.
#[derive(Debug)]
pub struct FakeHandle {
    pid: u32,
    output: PathBuf,
    output_size: Option<u64>,
    halts: AtomicUsize,
    exited: AtomicBool,
    exit_tx: Mutex<Option<oneshot::Sender<Option<i32>>>>,
}

impl FakeHandle {
    pub fn halt_count(&self) -> usize {
        self.halts.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    pub fn exit(&self) {
        if let Some(size) = self.output_size {
            let file = std::fs::File::create(&self.output).unwrap();
            file.set_len(size).unwrap();
        }
        self.exited.store(true, Ordering::SeqCst);
        if let Some(tx) = self.exit_tx.lock().take() {
            let _ = tx.send(Some(0));
        }
    }
}

impl CaptureHandle for FakeHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn terminate(&self, _signal: ProcessSignal) -> streamdvr::Result<()> {
        if !self.has_exited() {
            self.halts.fetch_add(1, Ordering::SeqCst);
            self.exit();
        }
        Ok(())
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeRecorder {
    next_pid: AtomicU32,
    /// Size of the recording each new recorder leaves behind.
    pub output_size: Mutex<Option<u64>>,
    /// How long starting a recorder blocks.
    pub spawn_delay: Mutex<Option<Duration>>,
    pub handles: Mutex<Vec<Arc<FakeHandle>>>,
}

impl FakeRecorder {
    pub fn last(&self) -> Arc<FakeHandle> {
        self.handles.lock().last().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.handles.lock().len()
    }
}

impl Recorder for FakeRecorder {
    fn spawn(&self, request: &SpawnRequest) -> streamdvr::Result<SpawnedCapture> {
        let delay = *self.spawn_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let (tx, rx) = oneshot::channel();
        let handle = Arc::new(FakeHandle {
            pid: 4000 + self.next_pid.fetch_add(1, Ordering::SeqCst),
            output: PathBuf::from(&request.args[0]),
            output_size: *self.output_size.lock(),
            halts: AtomicUsize::new(0),
            exited: AtomicBool::new(false),
            exit_tx: Mutex::new(Some(tx)),
        });
        self.handles.lock().push(handle.clone());
        Ok(SpawnedCapture { handle, exit: rx })
    }
}

#[derive(Default)]
pub struct FakeProbe {
    online: Mutex<HashMap<String, bool>>,
}

impl FakeProbe {
    pub fn set_online(&self, uid: &str, online: bool) {
        self.online.lock().insert(uid.to_string(), online);
    }
}

#[async_trait]
impl StateProbe for FakeProbe {
    async fn check(&self, streamer: &StreamerRef) -> streamdvr::Result<ProbeStatus> {
        let online = self.online.lock().get(&streamer.uid).copied().unwrap_or(false);
        Ok(if online {
            ProbeStatus::online(format!("https://cdn/{}.m3u8", streamer.uid))
        } else {
            ProbeStatus::offline()
        })
    }
}

/// Post-processor that only records what it saw.
#[derive(Default)]
pub struct NoopProcessor {
    pub seen: Mutex<Vec<String>>,
}

#[async_trait]
impl PostProcessor for NoopProcessor {
    async fn process(&self, entry: &PostProcessEntry) -> streamdvr::Result<()> {
        self.seen.lock().push(entry.streamer.uid.clone());
        Ok(())
    }
}

pub struct Harness {
    pub temp: TempDir,
    pub site: Arc<Site>,
    pub probe: Arc<FakeProbe>,
    pub recorder: Arc<FakeRecorder>,
    pub queue: Arc<PostProcessQueue>,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new(min_size_mb: u64, max_size_mb: u64) -> Self {
        let temp = TempDir::new().unwrap();
        let settings = SiteSettings {
            site: SiteConfig {
                name: "Test".to_string(),
                site_url: Some("https://example.com/".to_string()),
                recorder: PathBuf::from("scripts/record_ffmpeg.sh"),
                ..Default::default()
            },
            recording: RecordingConfig {
                capture_directory: temp.path().to_path_buf(),
                min_size_mb,
                max_size_mb,
                ..Default::default()
            },
            ..Default::default()
        };

        let probe = Arc::new(FakeProbe::default());
        let recorder = Arc::new(FakeRecorder::default());
        let queue = Arc::new(PostProcessQueue::new());
        let cancel = CancellationToken::new();
        let site = Arc::new(Site::new(
            settings,
            SiteDeps {
                probe: probe.clone(),
                args: Arc::new(ScriptArgs),
                recorder: recorder.clone(),
                queue: queue.clone(),
            },
            cancel.clone(),
        ));

        Self {
            temp,
            site,
            probe,
            recorder,
            queue,
            cancel,
        }
    }

    /// Add a streamer, report it online and start its capture.
    pub async fn capture(&self, name: &str) -> Arc<FakeHandle> {
        self.site
            .add(&StreamerRef::named(name), false, true)
            .unwrap();
        self.probe.set_online(name, true);
        self.site.check_streamer_state(name).await.unwrap();
        self.recorder.last()
    }

    /// Grow (or shrink) the recording a streamer is writing.
    pub fn write_recording(&self, name: &str, bytes: u64) {
        let filename = self.site.registry().get(name).unwrap().filename;
        let file = std::fs::File::create(self.temp.path().join(filename)).unwrap();
        file.set_len(bytes).unwrap();
    }
}

/// Wait until `cond` holds, failing the test after a few seconds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
