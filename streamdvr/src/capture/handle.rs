//! Handles to running recorder processes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::process::Child;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

pub use process_utils::ProcessSignal;

use crate::{Error, Result};

/// Opaque handle to an external recorder process.
///
/// Owned by exactly one [`Streamer`](crate::domain::Streamer); nothing else
/// keeps a reference for termination.
pub trait CaptureHandle: Send + Sync + std::fmt::Debug {
    /// Operating system process id.
    fn pid(&self) -> u32;

    /// Deliver `signal` to the process. A no-op once it has exited.
    fn terminate(&self, signal: ProcessSignal) -> Result<()>;

    /// Whether the process has exited.
    fn has_exited(&self) -> bool;
}

/// [`CaptureHandle`] for a process spawned by [`ProcessRecorder`](super::ProcessRecorder).
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    exited: Arc<AtomicBool>,
    /// Kills the child from its waiter task where signals are unavailable.
    kill_token: CancellationToken,
}

impl ProcessHandle {
    pub fn new(pid: u32, exited: Arc<AtomicBool>, kill_token: CancellationToken) -> Self {
        Self {
            pid,
            exited,
            kill_token,
        }
    }
}

impl CaptureHandle for ProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn terminate(&self, signal: ProcessSignal) -> Result<()> {
        // The pid may already belong to someone else.
        if self.has_exited() {
            return Ok(());
        }

        match process_utils::send_signal(self.pid, signal) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::Unsupported => {
                self.kill_token.cancel();
                Ok(())
            }
            Err(e) => Err(Error::Other(format!(
                "failed to send {} to pid {}: {}",
                signal, self.pid, e
            ))),
        }
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }
}

/// Spawn a task that waits for a process to exit and sends the result
/// through a oneshot channel.
///
/// If the kill token is triggered, the process is killed and `None` is sent
/// once it is gone. `exited` is set before the result is sent.
///
/// # Returns
/// A receiver that will receive:
/// * `Some(exit_code)` - If the process exited with a code
/// * `None` - If the process was killed or ended by a signal
pub fn spawn_process_waiter(
    mut child: Child,
    kill_token: CancellationToken,
    exited: Arc<AtomicBool>,
) -> oneshot::Receiver<Option<i32>> {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let exit_code = tokio::select! {
            _ = kill_token.cancelled() => {
                let _ = child.kill().await;
                None
            }
            status = child.wait() => {
                match status {
                    Ok(exit_status) => {
                        let code = exit_status.code();
                        if let Some(c) = code.filter(|c| *c != 0) {
                            warn!("Recorder exited with code: {}", c);
                        }
                        code
                    }
                    Err(e) => {
                        error!("Error waiting for recorder: {}", e);
                        Some(-1)
                    }
                }
            }
        };
        exited.store(true, Ordering::Release);
        let _ = tx.send(exit_code);
    });

    rx
}
