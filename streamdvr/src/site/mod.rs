//! Streaming sites.
//!
//! A [`Site`] owns the streamers of one site. It polls them in batches
//! through a [`StateProbe`], starts captures for online streamers and keeps
//! the membership lists that are saved back to the configuration.

mod membership;
mod probe;
mod service;
mod updates;

pub use membership::MemberLists;
pub use probe::{ProbeStatus, ScriptProbe, StateProbe};
pub use service::{CycleReport, STREAMLINK_RECORDER, Site, SiteDeps, SiteSettings};
pub use updates::SiteUpdates;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::Error;
    use crate::capture::ScriptArgs;
    use crate::capture::manager::tests::FakeRecorder;
    use crate::config::{RecordingConfig, SiteConfig};
    use crate::domain::StreamerRef;
    use crate::pipeline::PostProcessQueue;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    /// Probe answering from a table, recording every call.
    #[derive(Default)]
    pub(crate) struct ScriptedProbe {
        online: Mutex<HashMap<String, bool>>,
        failing: Mutex<HashSet<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProbe {
        pub fn set_online(&self, uid: &str, online: bool) {
            self.online.lock().insert(uid.to_string(), online);
        }

        pub fn set_failing(&self, uid: &str) {
            self.failing.lock().insert(uid.to_string());
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl StateProbe for ScriptedProbe {
        async fn check(&self, streamer: &StreamerRef) -> crate::Result<ProbeStatus> {
            self.calls.lock().push(streamer.uid.clone());
            if self.failing.lock().contains(&streamer.uid) {
                return Err(Error::probe(&streamer.uid, "timed out"));
            }
            let online = self.online.lock().get(&streamer.uid).copied().unwrap_or(false);
            Ok(if online {
                ProbeStatus::online(format!("https://cdn/{}.m3u8", streamer.uid))
            } else {
                ProbeStatus::offline()
            })
        }
    }

    pub(crate) struct SiteFixture {
        pub temp: TempDir,
        pub site: Arc<Site>,
        pub probe: Arc<ScriptedProbe>,
        pub recorder: Arc<FakeRecorder>,
        pub queue: Arc<PostProcessQueue>,
        pub cancel: CancellationToken,
    }

    impl SiteFixture {
        pub fn new(streamers: Vec<&str>) -> Self {
            Self::build(streamers, false, |_| {})
        }

        pub fn with_updates_file(streamers: Vec<&str>) -> Self {
            Self::build(streamers, true, |_| {})
        }

        pub fn build(
            streamers: Vec<&str>,
            updates: bool,
            tweak: impl FnOnce(&mut SiteSettings),
        ) -> Self {
            let temp = TempDir::new().unwrap();
            let mut settings = SiteSettings {
                site: SiteConfig {
                    name: "Test".to_string(),
                    site_url: Some("https://example.com/".to_string()),
                    recorder: PathBuf::from("scripts/record_ffmpeg.sh"),
                    batch_size: 2,
                    streamers: streamers.into_iter().map(String::from).collect(),
                    updates_file: updates.then(|| temp.path().join("test_updates.json")),
                    ..Default::default()
                },
                recording: RecordingConfig {
                    capture_directory: temp.path().to_path_buf(),
                    complete_directory: temp.path().join("complete"),
                    ..Default::default()
                },
                ..Default::default()
            };
            tweak(&mut settings);

            let probe = Arc::new(ScriptedProbe::default());
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

        pub fn updates_path(&self) -> PathBuf {
            self.temp.path().join("test_updates.json")
        }
    }

    /// Wait for the next refresh request and check who it is for.
    pub(crate) async fn next_refresh_is(fx: &SiteFixture, uid: &str) {
        let got = tokio::time::timeout(Duration::from_secs(5), fx.site.next_refresh())
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some(uid));
    }
}
