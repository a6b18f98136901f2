//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// Every variant is recoverable: the orchestration core reports it and
/// carries on with the next streamer or the next cycle.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{uid} is already in the capture list")]
    DuplicateEntry { uid: String },

    #[error("{uid} is not in the capture list")]
    UnknownEntry { uid: String },

    #[error("Status check failed for {uid}: {reason}")]
    ProbeFailure { uid: String, reason: String },

    #[error("Failed to start recorder for {uid}: {reason}")]
    SpawnFailure { uid: String, reason: String },

    #[error("Recording {} not found for {uid}", path.display())]
    OutputMissing { uid: String, path: PathBuf },

    #[error("Recording for {uid} appears to be stuck at {size_mb}MB")]
    StuckRecording { uid: String, size_mb: u64 },

    #[error("Recording for {uid} exceeded size limit ({size_mb}MB >= {max_size_mb}MB)")]
    SizeLimitExceeded {
        uid: String,
        size_mb: u64,
        max_size_mb: u64,
    },

    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn duplicate(uid: impl Into<String>) -> Self {
        Self::DuplicateEntry { uid: uid.into() }
    }

    pub fn unknown(uid: impl Into<String>) -> Self {
        Self::UnknownEntry { uid: uid.into() }
    }

    pub fn probe(uid: impl Into<String>, reason: impl ToString) -> Self {
        Self::ProbeFailure {
            uid: uid.into(),
            reason: reason.to_string(),
        }
    }

    pub fn spawn(uid: impl Into<String>, reason: impl ToString) -> Self {
        Self::SpawnFailure {
            uid: uid.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this error describes a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::OutputMissing { .. } => true,
            Self::IoPath { source, .. } | Self::Io(source) => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
