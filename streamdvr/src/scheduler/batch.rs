//! Batch planning and execution.

use std::future::Future;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Error;

/// Ordered batches of uids for one polling cycle.
pub type BatchPlan = Vec<Vec<String>>;

/// Partition `uids` into batches, keeping their order.
///
/// A `batch_size` of 0 polls everyone in a single batch; 1 polls serially.
pub fn plan(uids: &[String], batch_size: usize) -> BatchPlan {
    if uids.is_empty() {
        return Vec::new();
    }
    if batch_size == 0 {
        return vec![uids.to_vec()];
    }
    uids.chunks(batch_size).map(<[String]>::to_vec).collect()
}

/// A member of a batch whose check failed.
#[derive(Debug)]
pub struct BatchFailure {
    pub uid: String,
    pub error: Error,
}

/// Outcome of one [`execute`] run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Members whose check ran, successful or not.
    pub checked: usize,
    pub failures: Vec<BatchFailure>,
    /// Set when the run stopped early because of cancellation.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn success_count(&self) -> usize {
        self.checked - self.failures.len()
    }
}

/// Run `check` over every uid of `plan`.
///
/// Batches run strictly in order; within a batch all checks run concurrently
/// and the next batch only starts once every member has finished. A failing
/// member is recorded and does not abort its batch. Cancellation is honoured
/// between batches.
pub async fn execute<F, Fut>(plan: &BatchPlan, cancel: &CancellationToken, check: F) -> BatchReport
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<(), Error>>,
{
    let mut report = BatchReport::default();

    for (index, batch) in plan.iter().enumerate() {
        if cancel.is_cancelled() {
            debug!(remaining = plan.len() - index, "Polling cancelled");
            report.cancelled = true;
            break;
        }

        debug!(batch = index, size = batch.len(), "Checking batch");
        let results = join_all(batch.iter().map(|uid| {
            let uid = uid.clone();
            let fut = check(uid.clone());
            async move { (uid, fut.await) }
        }))
        .await;

        for (uid, result) in results {
            report.checked += 1;
            if let Err(error) = result {
                warn!(uid = %uid, "Status check failed: {}", error);
                report.failures.push(BatchFailure { uid, error });
            }
        }
    }

    report
}
