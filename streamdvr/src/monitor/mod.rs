//! Monitoring of recordings in progress.

mod size;

pub use size::{STUCK_THRESHOLD, SizeMonitor, SizeVerdict};
