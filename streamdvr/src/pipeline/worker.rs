//! Single consumer draining the post-process queue.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::queue::{PostProcessEntry, PostProcessQueue};
use crate::Result;

/// The transformation applied to a finished recording.
#[async_trait]
pub trait PostProcessor: Send + Sync {
    async fn process(&self, entry: &PostProcessEntry) -> Result<()>;
}

/// Drains a [`PostProcessQueue`] strictly in order, one entry at a time.
pub struct PostProcessWorker {
    queue: Arc<PostProcessQueue>,
    processor: Arc<dyn PostProcessor>,
}

impl PostProcessWorker {
    pub fn new(queue: Arc<PostProcessQueue>, processor: Arc<dyn PostProcessor>) -> Self {
        Self { queue, processor }
    }

    /// Run until `stop` is cancelled and the queue is empty.
    ///
    /// Entries still queued when `stop` fires are processed first; a finished
    /// recording is never dropped on shutdown.
    pub async fn run(self, stop: CancellationToken) {
        debug!("Post-process worker started");

        loop {
            self.drain().await;

            if stop.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = self.queue.drain_signal() => {}
                _ = stop.cancelled() => {}
            }
        }

        debug!("Post-process worker stopped");
    }

    /// Process entries until the queue is empty.
    pub async fn drain(&self) {
        while let Some(entry) = self.queue.front() {
            self.process_one(&entry).await;
            self.queue.complete_front();
        }
    }

    async fn process_one(&self, entry: &PostProcessEntry) {
        let site = entry.site.site_name();
        let uid = entry.streamer.uid.as_str();

        entry.site.mark_processing(uid, entry.capture);
        info!(
            site,
            streamer = %entry.streamer.name,
            filename = %entry.filename,
            "Post-processing recording"
        );

        match self.processor.process(entry).await {
            Ok(()) => info!(
                site,
                streamer = %entry.streamer.name,
                filename = %entry.filename,
                "Post-processing finished"
            ),
            Err(e) => error!(
                site,
                streamer = %entry.streamer.name,
                filename = %entry.filename,
                "Post-processing failed: {}",
                e
            ),
        }

        entry.site.clear_processing(uid, entry.capture);
    }
}
