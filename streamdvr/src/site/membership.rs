//! Adding, removing and pausing streamers.

use tracing::{error, info};

use super::service::Site;
use crate::domain::{StreamerRef, StreamerState};
use crate::{Error, Result};

/// Streamer lists of a site.
#[derive(Debug, Default)]
pub struct MemberLists {
    /// Saved back to the configuration.
    pub persisted: Vec<String>,
    /// Session only.
    pub temporary: Vec<String>,
}

impl MemberLists {
    fn list_mut(&mut self, temporary: bool) -> &mut Vec<String> {
        if temporary {
            &mut self.temporary
        } else {
            &mut self.persisted
        }
    }
}

impl Site {
    /// Start tracking a streamer.
    ///
    /// Returns whether the persisted list changed. Unless `init` is set the
    /// new streamer is checked right away.
    pub fn add(&self, id: &StreamerRef, temporary: bool, init: bool) -> Result<bool> {
        let newly_listed = {
            let mut lists = self.lists.lock();
            let list = lists.list_mut(temporary);
            let absent = !list.contains(&id.uid);
            if absent {
                list.push(id.uid.clone());
            }
            absent
        };

        if self.registry().add(id, temporary) && !init {
            self.capture.refresh(&id.uid);
        }

        if !newly_listed {
            let err = Error::duplicate(&id.name);
            error!(site = %self.name(), "{}", err);
            return Err(err);
        }

        info!(
            site = %self.name(),
            streamer = %id.name,
            "{} added to capture list{}",
            id.name,
            if temporary { " (temporarily)" } else { "" }
        );
        Ok(!temporary)
    }

    /// Stop tracking a streamer.
    ///
    /// A running capture is halted first, but removal does not wait for the
    /// recorder to exit: the recording is still resolved and post-processed
    /// once it does, without touching any later record for the same uid.
    pub fn remove(&self, uid: &str) -> Result<bool> {
        let capture = &self.capture;
        let Some(removed) = self.registry().remove_with(uid, |s| {
            capture.halt_streamer(s);
        }) else {
            let err = Error::unknown(uid);
            error!(site = %self.name(), "{}", err);
            return Err(err);
        };

        info!(
            site = %self.name(),
            streamer = %removed.name,
            "{} removed from capture list",
            removed.name
        );

        let mut lists = self.lists.lock();
        lists.temporary.retain(|u| u != uid);
        let before = lists.persisted.len();
        lists.persisted.retain(|u| u != uid);
        Ok(lists.persisted.len() != before)
    }

    /// Pause or unpause a streamer. Never changes the persisted list.
    pub fn pause(&self, uid: &str, on: bool) -> Result<()> {
        let Some((name, state)) = self.registry().update(uid, |s| {
            s.paused = on;
            (s.name.clone(), s.state)
        }) else {
            let err = Error::unknown(uid);
            error!(site = %self.name(), "{}", err);
            return Err(err);
        };

        if on {
            info!(site = %self.name(), streamer = %name, "{} is paused", name);
            self.capture.halt(uid);
        } else {
            info!(site = %self.name(), streamer = %name, "{} is unpaused", name);
            if state != StreamerState::Offline {
                self.capture.refresh(uid);
            }
        }
        Ok(())
    }

    /// Pause or unpause every streamer of the site.
    pub fn pause_all(&self, on: bool) {
        for uid in self.registry().uids() {
            // Only fails for streamers removed since the snapshot.
            let _ = self.pause(&uid, on);
        }
    }

    /// Add or remove a list of streamers. Returns whether the persisted
    /// list changed.
    pub fn update_streamers(&self, ids: &[StreamerRef], add: bool, init: bool) -> bool {
        ids.iter().fold(false, |dirty, id| {
            let changed = if add {
                self.add(id, false, init)
            } else {
                self.remove(&id.uid)
            };
            changed.unwrap_or(false) || dirty
        })
    }

    /// Persisted streamer uids, in the order they were added.
    pub fn persisted_streamers(&self) -> Vec<String> {
        self.lists.lock().persisted.clone()
    }

    pub fn temporary_streamers(&self) -> Vec<String> {
        self.lists.lock().temporary.clone()
    }
}
