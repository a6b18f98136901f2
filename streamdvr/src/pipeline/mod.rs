//! Post-processing of finished recordings.
//!
//! Finished recordings are handed off through a FIFO [`PostProcessQueue`].
//! A single [`PostProcessWorker`] drains it, one entry at a time, through a
//! [`PostProcessor`].

mod processors;
mod queue;
mod worker;

pub use processors::{MoveProcessor, complete_dir};
pub use queue::{PostProcessEntry, PostProcessQueue, ProcessingTarget};
pub use worker::{PostProcessWorker, PostProcessor};
