//! Built-in post-processors.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::queue::PostProcessEntry;
use super::worker::PostProcessor;
use crate::Result;
use crate::config::RecordingConfig;
use crate::utils::filename::{sanitize_component, with_extension};
use crate::utils::fs;

/// Directory a finished recording belongs in.
///
/// `complete_directory[/<site>][/<name>[_<site>]]`, following the
/// `site_subdir`, `streamer_subdir` and `include_site_in_dir` settings.
pub fn complete_dir(recording: &RecordingConfig, site: &str, streamer: &str) -> PathBuf {
    let mut dir = recording.complete_directory.clone();

    if recording.site_subdir {
        dir.push(sanitize_component(site));
    }
    if recording.streamer_subdir {
        let name = if recording.include_site_in_dir {
            format!("{}_{}", streamer, site.to_lowercase())
        } else {
            streamer.to_string()
        };
        dir.push(sanitize_component(&name));
    }

    dir
}

/// Moves a finished recording from the capture directory into its
/// completion directory.
#[derive(Debug, Clone)]
pub struct MoveProcessor {
    recording: RecordingConfig,
}

impl MoveProcessor {
    pub fn new(recording: RecordingConfig) -> Self {
        Self { recording }
    }
}

#[async_trait]
impl PostProcessor for MoveProcessor {
    async fn process(&self, entry: &PostProcessEntry) -> Result<()> {
        let file = with_extension(&entry.filename);
        let source = entry.site.capture_dir().join(&file);
        let dest_dir = complete_dir(&self.recording, entry.site.site_name(), &entry.streamer.name);
        fs::ensure_dir_all_with_op("creating completion directory", &dest_dir).await?;
        let dest = dest_dir.join(&file);

        debug!(from = %source.display(), to = %dest.display(), "Moving recording");

        if tokio::fs::rename(&source, &dest).await.is_ok() {
            return Ok(());
        }

        // rename fails across filesystems; fall back to copy + delete.
        tokio::fs::copy(&source, &dest)
            .await
            .map_err(|e| fs::io_error("copying recording", &source, e))?;
        if let Err(e) = tokio::fs::remove_file(&source).await {
            warn!(path = %source.display(), "Failed to remove moved recording: {}", e);
        }
        Ok(())
    }
}
