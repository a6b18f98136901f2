//! Spawning recorder processes.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::handle::{CaptureHandle, ProcessHandle, spawn_process_waiter};
use crate::utils::fs;
use crate::{Error, Result};

/// Everything needed to launch one recorder.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Streamer the capture is for (used in error reports).
    pub uid: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Redirect stdout/stderr here instead of discarding them.
    pub log_file: Option<PathBuf>,
}

impl SpawnRequest {
    /// Human readable command line for logs.
    pub fn command_line(&self) -> String {
        let mut cmd = self.program.display().to_string();
        for arg in &self.args {
            cmd.push(' ');
            cmd.push_str(arg);
        }
        cmd
    }
}

/// A started recorder: its handle plus a future resolving on exit.
#[derive(Debug)]
pub struct SpawnedCapture {
    pub handle: Arc<dyn CaptureHandle>,
    pub exit: oneshot::Receiver<Option<i32>>,
}

/// Starts recorder processes.
pub trait Recorder: Send + Sync {
    /// Spawn a recorder. Never blocks on the process.
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedCapture>;
}

/// [`Recorder`] running the configured executable as a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRecorder;

impl ProcessRecorder {
    pub fn new() -> Self {
        Self
    }

    fn output_sinks(request: &SpawnRequest) -> Result<(Stdio, Stdio)> {
        let Some(path) = &request.log_file else {
            return Ok((Stdio::null(), Stdio::null()));
        };

        let file = std::fs::File::create(path)
            .map_err(|e| fs::io_error("creating recorder log", path, e))?;
        let stderr = file
            .try_clone()
            .map_err(|e| fs::io_error("opening recorder log", path, e))?;
        Ok((Stdio::from(file), Stdio::from(stderr)))
    }
}

impl Recorder for ProcessRecorder {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedCapture> {
        let (stdout, stderr) = Self::output_sinks(request)?;

        let child = process_utils::tokio_command(&request.program)
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| Error::spawn(&request.uid, e))?;

        // The log file handles moved into the child are closed when it exits.
        let pid = child
            .id()
            .ok_or_else(|| Error::spawn(&request.uid, "recorder has no process id"))?;

        let exited = Arc::new(AtomicBool::new(false));
        let kill_token = CancellationToken::new();
        let exit = spawn_process_waiter(child, kill_token.clone(), exited.clone());

        Ok(SpawnedCapture {
            handle: Arc::new(ProcessHandle::new(pid, exited, kill_token)),
            exit,
        })
    }
}
