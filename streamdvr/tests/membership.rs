mod common;

use std::time::Duration;

use common::{Harness, MB, eventually};
use streamdvr::Error;
use streamdvr::capture::CaptureHandle;
use streamdvr::domain::{StreamerRef, StreamerState};
use streamdvr::pipeline::ProcessingTarget;

#[tokio::test]
async fn adding_twice_keeps_one_entry() {
    let h = Harness::new(5, 0);
    let alice = StreamerRef::named("alice");

    assert!(h.site.add(&alice, false, true).unwrap());
    assert!(matches!(
        h.site.add(&alice, false, true),
        Err(Error::DuplicateEntry { .. })
    ));
    assert_eq!(h.site.registry().len(), 1);
    assert_eq!(h.site.persisted_streamers(), vec!["alice"]);
}

#[tokio::test]
async fn removing_a_capturing_streamer_halts_once() {
    let h = Harness::new(5, 0);
    let handle = h.capture("alice").await;

    assert!(h.site.remove("alice").unwrap());

    assert_eq!(handle.halt_count(), 1);
    assert!(h.site.registry().get("alice").is_none());
    assert!(h.site.registry().list().is_empty());
    assert!(matches!(
        h.site.remove("alice"),
        Err(Error::UnknownEntry { .. })
    ));
}

// Removal does not wait for the recorder. The recording it leaves behind is
// still resolved and queued, and releasing it later finds no record to touch.
#[tokio::test]
async fn removed_streamer_recording_is_detached() {
    let h = Harness::new(5, 0);
    *h.recorder.output_size.lock() = Some(50 * MB);
    let handle = h.capture("alice").await;

    h.site.remove("alice").unwrap();
    assert_eq!(handle.halt_count(), 1);

    eventually(|| h.queue.len() == 1).await;
    let entry = h.queue.front().unwrap();
    assert_eq!(entry.streamer.uid, "alice");
    assert!(h.temp.path().join(format!("{}.ts", entry.filename)).exists());

    entry.site.mark_processing("alice", entry.capture);
    entry.site.clear_processing("alice", entry.capture);
    assert!(h.site.registry().get("alice").is_none());

    // Adding the streamer again starts from a clean record.
    h.site
        .add(&StreamerRef::named("alice"), false, true)
        .unwrap();
    let alice = h.site.registry().get("alice").unwrap();
    assert_eq!(alice.state, StreamerState::Offline);
    assert!(!alice.has_capture());
}

#[tokio::test]
async fn late_exit_of_removed_recorder_spares_the_new_capture() {
    let h = Harness::new(5, 0);
    let old = h.capture("alice").await;
    let old_capture = h.site.registry().get("alice").unwrap().capture_id;

    // The old recorder is interrupted, but its exit is handled only after
    // the streamer is back and recording again.
    assert!(h.site.remove("alice").unwrap());
    assert_eq!(old.halt_count(), 1);
    h.site
        .add(&StreamerRef::named("alice"), false, true)
        .unwrap();
    h.site.check_streamer_state("alice").await.unwrap();
    let current = h.recorder.last();
    assert_eq!(h.recorder.count(), 2);
    assert_ne!(
        h.site.registry().get("alice").unwrap().capture_id,
        old_capture
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    h.site.process_pending_refreshes().await;

    let alice = h.site.registry().get("alice").unwrap();
    assert!(current.is_running());
    assert_eq!(alice.state, StreamerState::Capturing);
    assert_eq!(alice.capture.unwrap().pid(), current.pid());

    // Still one recorder for the streamer, and it can be halted.
    h.site.check_streamer_state("alice").await.unwrap();
    assert_eq!(h.recorder.count(), 2);
    assert!(h.site.remove("alice").unwrap());
    assert_eq!(current.halt_count(), 1);
}

#[tokio::test]
async fn pausing_halts_and_blocks_new_captures() {
    let h = Harness::new(5, 0);
    let handle = h.capture("alice").await;

    h.site.pause("alice", true).unwrap();
    assert_eq!(handle.halt_count(), 1);
    eventually(|| !h.site.registry().get("alice").unwrap().has_capture()).await;

    h.site.get_streamers().await;
    assert_eq!(h.recorder.count(), 1);
    assert_eq!(
        h.site.registry().get("alice").unwrap().state,
        StreamerState::Streaming
    );

    // Unpausing an online streamer re-checks it right away.
    h.site.pause("alice", false).unwrap();
    h.site.process_pending_refreshes().await;
    assert_eq!(h.recorder.count(), 2);
    // Pausing never touches the persisted list.
    assert_eq!(h.site.persisted_streamers(), vec!["alice"]);
}

#[tokio::test]
async fn pause_all_then_resume() {
    let h = Harness::new(5, 0);
    let alice = h.capture("alice").await;
    let bob = h.capture("bob").await;

    h.site.pause_all(true);
    assert_eq!(alice.halt_count(), 1);
    assert_eq!(bob.halt_count(), 1);
    assert!(h.site.registry().list().iter().all(|s| s.paused));

    h.site.pause_all(false);
    assert!(h.site.registry().list().iter().all(|s| !s.paused));
}
