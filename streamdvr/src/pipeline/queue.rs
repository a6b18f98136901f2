//! FIFO hand-off of finished recordings.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::domain::{CaptureId, StreamerRef};

/// The site a queued recording belongs to.
///
/// The post-processor uses it to pin the streamer while it works and to
/// release it back to normal polling afterwards.
pub trait ProcessingTarget: Send + Sync {
    fn site_name(&self) -> &str;

    /// Directory the recording was captured into.
    fn capture_dir(&self) -> &Path;

    /// Mark the streamer as post-processing so nothing halts its capture.
    ///
    /// Only applies while the record still owns `capture`.
    fn mark_processing(&self, uid: &str, capture: CaptureId);

    /// Release the streamer: drop its capture handle and re-check it.
    ///
    /// Only applies while the record still owns `capture`.
    fn clear_processing(&self, uid: &str, capture: CaptureId);
}

/// A finished recording awaiting post-processing.
#[derive(Clone)]
pub struct PostProcessEntry {
    pub site: Arc<dyn ProcessingTarget>,
    pub streamer: StreamerRef,
    /// The capture that produced the recording.
    pub capture: CaptureId,
    /// Recording filename without extension.
    pub filename: String,
}

impl std::fmt::Debug for PostProcessEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostProcessEntry")
            .field("site", &self.site.site_name())
            .field("streamer", &self.streamer)
            .field("capture", &self.capture)
            .field("filename", &self.filename)
            .finish()
    }
}

/// FIFO of finished recordings.
///
/// The entry being processed stays at the front until the worker completes
/// it, so an enqueue onto an empty queue is exactly the moment the consumer
/// has to be woken.
#[derive(Debug, Default)]
pub struct PostProcessQueue {
    entries: Mutex<VecDeque<PostProcessEntry>>,
    notify: Notify,
}

impl PostProcessQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    ///
    /// Returns `true` when the queue was empty and the consumer was signalled
    /// to start draining.
    pub fn enqueue(&self, entry: PostProcessEntry) -> bool {
        let was_empty = {
            let mut entries = self.entries.lock();
            let was_empty = entries.is_empty();
            debug!(
                site = entry.site.site_name(),
                streamer = %entry.streamer.name,
                filename = %entry.filename,
                depth = entries.len() + 1,
                "Queued recording for post-processing"
            );
            entries.push_back(entry);
            was_empty
        };

        if was_empty {
            self.notify.notify_one();
        }
        was_empty
    }

    /// The entry to process next, left in place.
    pub fn front(&self) -> Option<PostProcessEntry> {
        self.entries.lock().front().cloned()
    }

    /// Drop the front entry once it has been processed.
    pub fn complete_front(&self) -> Option<PostProcessEntry> {
        self.entries.lock().pop_front()
    }

    /// Wait for the drain signal.
    pub async fn drain_signal(&self) {
        self.notify.notified().await;
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::path::PathBuf;

    /// Records mark/clear calls in order.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingTarget {
        pub calls: PlMutex<Vec<String>>,
        pub dir: PathBuf,
    }

    impl ProcessingTarget for RecordingTarget {
        fn site_name(&self) -> &str {
            "Test"
        }

        fn capture_dir(&self) -> &Path {
            &self.dir
        }

        fn mark_processing(&self, uid: &str, _capture: CaptureId) {
            self.calls.lock().push(format!("mark:{}", uid));
        }

        fn clear_processing(&self, uid: &str, _capture: CaptureId) {
            self.calls.lock().push(format!("clear:{}", uid));
        }
    }

    pub(crate) fn entry(target: &Arc<RecordingTarget>, name: &str) -> PostProcessEntry {
        PostProcessEntry {
            site: target.clone(),
            streamer: StreamerRef::named(name),
            capture: CaptureId::new(1),
            filename: format!("{}_20240101", name),
        }
    }

    #[test]
    fn test_only_first_enqueue_signals() {
        let target = Arc::new(RecordingTarget::default());
        let queue = PostProcessQueue::new();

        assert!(queue.enqueue(entry(&target, "alice")));
        assert!(!queue.enqueue(entry(&target, "bob")));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_fifo_order_and_front_stays_until_completed() {
        let target = Arc::new(RecordingTarget::default());
        let queue = PostProcessQueue::new();
        queue.enqueue(entry(&target, "alice"));
        queue.enqueue(entry(&target, "bob"));

        assert_eq!(queue.front().unwrap().streamer.name, "alice");
        assert_eq!(queue.front().unwrap().streamer.name, "alice");
        assert_eq!(queue.complete_front().unwrap().streamer.name, "alice");
        assert_eq!(queue.front().unwrap().streamer.name, "bob");

        // Still busy with bob: no new signal.
        assert!(!queue.enqueue(entry(&target, "carol")));
        queue.complete_front();
        queue.complete_front();
        assert!(queue.is_empty());

        assert!(queue.enqueue(entry(&target, "dave")));
    }

    #[tokio::test]
    async fn test_signal_is_not_lost_without_waiter() {
        let target = Arc::new(RecordingTarget::default());
        let queue = PostProcessQueue::new();
        queue.enqueue(entry(&target, "alice"));

        // The permit is stored until someone waits.
        tokio::time::timeout(std::time::Duration::from_secs(1), queue.drain_signal())
            .await
            .unwrap();
    }
}
