//! Streamer registry implementation.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::{Streamer, StreamerRef};

#[derive(Debug, Default)]
struct Entries {
    /// Insertion order, used to form batches.
    order: Vec<String>,
    by_uid: HashMap<String, Streamer>,
}

/// Ordered map of uid to [`Streamer`].
///
/// Reads hand out snapshots; mutation goes through closures so no lock is
/// ever held across an `.await`. Callers must not assume atomicity across
/// separate calls.
#[derive(Debug, Default)]
pub struct StreamerRegistry {
    entries: RwLock<Entries>,
}

impl StreamerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new Offline, unpaused streamer.
    ///
    /// Returns `false` without touching the existing entry when the uid is
    /// already tracked.
    pub fn add(&self, id: &StreamerRef, is_temporary: bool) -> bool {
        let mut entries = self.entries.write();
        if entries.by_uid.contains_key(&id.uid) {
            return false;
        }
        entries.order.push(id.uid.clone());
        entries
            .by_uid
            .insert(id.uid.clone(), Streamer::new(id, is_temporary));
        true
    }

    /// Remove a streamer, running `before` on the record first.
    ///
    /// `before` runs under the write lock, so nothing can observe the entry
    /// between it and the deletion.
    pub fn remove_with(&self, uid: &str, before: impl FnOnce(&Streamer)) -> Option<Streamer> {
        let mut entries = self.entries.write();
        let streamer = entries.by_uid.get(uid)?;
        before(streamer);
        entries.order.retain(|u| u != uid);
        entries.by_uid.remove(uid)
    }

    /// Snapshot of a single streamer.
    pub fn get(&self, uid: &str) -> Option<Streamer> {
        self.entries.read().by_uid.get(uid).cloned()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.entries.read().by_uid.contains_key(uid)
    }

    /// Snapshot of every streamer in insertion order.
    pub fn list(&self) -> Vec<Streamer> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|uid| entries.by_uid.get(uid).cloned())
            .collect()
    }

    /// Tracked uids in insertion order.
    pub fn uids(&self) -> Vec<String> {
        self.entries.read().order.clone()
    }

    /// Mutate one streamer in place.
    ///
    /// Returns `None` when the uid is not tracked (e.g. removed while a
    /// capture was still running).
    pub fn update<R>(&self, uid: &str, f: impl FnOnce(&mut Streamer) -> R) -> Option<R> {
        self.entries.write().by_uid.get_mut(uid).map(f)
    }

    /// Read one streamer in place without cloning it.
    pub fn with<R>(&self, uid: &str, f: impl FnOnce(&Streamer) -> R) -> Option<R> {
        self.entries.read().by_uid.get(uid).map(f)
    }

    /// Number of streamers holding a capture handle.
    pub fn captures_in_progress(&self) -> usize {
        self.entries
            .read()
            .by_uid
            .values()
            .filter(|s| s.has_capture())
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().by_uid.is_empty()
    }
}
