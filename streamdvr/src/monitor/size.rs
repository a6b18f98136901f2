//! Stuck and oversize detection for running captures.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::Error;
use crate::capture::CaptureManager;
use crate::domain::Streamer;
use crate::utils::fs;

/// Observations without growth after which a recording counts as stuck.
pub const STUCK_THRESHOLD: u32 = 2;

/// What one observation of a recording concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeVerdict {
    Growing,
    Stuck,
    TooLarge,
}

/// Watches the recording files of running captures.
#[derive(Debug, Clone)]
pub struct SizeMonitor {
    capture_dir: PathBuf,
    /// 0 disables the size limit.
    max_size_mb: u64,
}

impl SizeMonitor {
    pub fn new(capture_dir: impl Into<PathBuf>, max_size_mb: u64) -> Self {
        Self {
            capture_dir: capture_dir.into(),
            max_size_mb,
        }
    }

    /// Record one observation of `size_mb` on the streamer.
    ///
    /// An unchanged size bumps the stuck counter; any other size is stored
    /// as the new baseline. A stuck verdict resets the counter.
    pub fn observe(&self, streamer: &mut Streamer, size_mb: u64) -> SizeVerdict {
        if size_mb == streamer.last_size_mb {
            streamer.stuck_count += 1;
        } else {
            streamer.last_size_mb = size_mb;
        }

        if streamer.stuck_count >= STUCK_THRESHOLD {
            streamer.stuck_count = 0;
            SizeVerdict::Stuck
        } else if self.max_size_mb != 0 && size_mb >= self.max_size_mb {
            SizeVerdict::TooLarge
        } else {
            SizeVerdict::Growing
        }
    }

    /// Check every running capture once, halting stuck or oversize ones.
    ///
    /// Returns the reason for every halt issued.
    pub async fn check(&self, capture: &CaptureManager) -> Vec<Error> {
        let mut halted = Vec::new();

        for streamer in capture.registry().list() {
            if !streamer.has_capture() || streamer.is_post_processing() {
                continue;
            }

            let path = self.capture_dir.join(&streamer.filename);
            let size_mb = match fs::file_size(&path).await {
                Ok(bytes) => fs::rounded_mb(bytes),
                Err(e) => {
                    // The recorder may not have created the file yet.
                    warn!(streamer = %streamer.name, "{}", e);
                    continue;
                }
            };
            debug!(
                streamer = %streamer.name,
                file = %streamer.filename,
                size_mb,
                max_size_mb = self.max_size_mb,
                "Checked recording size"
            );

            let Some(verdict) = capture
                .registry()
                .update(&streamer.uid, |s| self.observe(s, size_mb))
            else {
                continue;
            };

            let reason = match verdict {
                SizeVerdict::Growing => continue,
                SizeVerdict::Stuck => {
                    info!(
                        streamer = %streamer.name,
                        "Terminating stuck recording, file size is not increasing: {}MB",
                        size_mb
                    );
                    Error::StuckRecording {
                        uid: streamer.uid.clone(),
                        size_mb,
                    }
                }
                SizeVerdict::TooLarge => {
                    info!(
                        streamer = %streamer.name,
                        "Recording has exceeded file size limit (size={}MB >= maxSize={}MB)",
                        size_mb,
                        self.max_size_mb
                    );
                    Error::SizeLimitExceeded {
                        uid: streamer.uid.clone(),
                        size_mb,
                        max_size_mb: self.max_size_mb,
                    }
                }
            };

            capture.halt(&streamer.uid);
            halted.push(reason);
        }

        halted
    }
}
