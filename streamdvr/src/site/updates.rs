//! Include/exclude files dropped next to the configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::service::Site;
use crate::Result;
use crate::domain::StreamerRef;
use crate::utils::fs;

/// Pending membership changes for a site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteUpdates {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl SiteUpdates {
    /// Read an updates file. `None` when it does not exist.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(fs::io_error("reading updates", path, e)),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write_atomic(path, raw.as_bytes()).await
    }

    /// Take the include (or exclude) list, leaving it empty.
    pub fn take(&mut self, add: bool) -> Vec<String> {
        std::mem::take(if add {
            &mut self.include
        } else {
            &mut self.exclude
        })
    }
}

impl Site {
    /// Apply the site's updates file.
    ///
    /// The processed list is cleared from the file before it is applied.
    /// Returns whether the persisted list changed.
    pub async fn process_updates(&self, add: bool) -> Result<bool> {
        let Some(path) = self.settings.site.updates_file.as_deref() else {
            return Ok(false);
        };

        let Some(mut updates) = SiteUpdates::load(path).await? else {
            debug!(site = %self.name(), "{} does not exist", path.display());
            return Ok(false);
        };

        let names = updates.take(add);
        if names.is_empty() {
            return Ok(false);
        }

        info!(
            site = %self.name(),
            "{} streamer(s) to {}",
            names.len(),
            if add { "include" } else { "exclude" }
        );
        updates.save(path).await?;

        let ids: Vec<StreamerRef> = names.into_iter().map(StreamerRef::named).collect();
        Ok(self.update_streamers(&ids, add, false))
    }
}
