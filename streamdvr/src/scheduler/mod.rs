//! Per-cycle status polling.
//!
//! Streamers are polled in bounded-concurrency batches: members of a batch
//! are checked concurrently, batches run one after another.

mod batch;

pub use batch::{BatchFailure, BatchPlan, BatchReport, execute, plan};
