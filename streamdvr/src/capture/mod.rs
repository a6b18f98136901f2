//! Capture process management.
//!
//! A capture is the lifecycle of one external recorder process: arguments
//! are built by a [`SpawnArgsBuilder`], the process is started by a
//! [`Recorder`], and the [`CaptureManager`] watches it until it exits and
//! decides what happens to the recording.

mod args;
mod handle;
pub(crate) mod manager;
mod recorder;

pub use args::{CaptureContext, ScriptArgs, SpawnArgsBuilder, auth_args};
pub use handle::{CaptureHandle, ProcessHandle, ProcessSignal, spawn_process_waiter};
pub use manager::{CaptureManager, CaptureSettings, ExitOutcome};
pub use recorder::{ProcessRecorder, Recorder, SpawnRequest, SpawnedCapture};
