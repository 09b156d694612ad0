//! Store abstraction the queue is built upon.
//!
//! All the worker needs from a store is an atomic "conditional read and update":
//! hand a due job to exactly one claimant and move it along the state machine.
//! [`Client`](crate::Client) does that with PostgreSQL row locks, [`MemoryStore`]
//! with a single mutex.

mod memory;
mod postgres;

pub use memory::MemoryStore;

use crate::job::{ActiveJob, Job, JobState};
use crate::queue::QueueOptions;
use crate::Error;
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// Error recorded on jobs reclaimed by the lease sweeper.
pub(crate) const LEASE_EXPIRED: &str = "job lease expired";

pub(crate) const DEFAULT_RETRY_LIMIT: usize = 2;
pub(crate) const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub(crate) const DEFAULT_RETRY_BACKOFF: bool = true;
pub(crate) const DEFAULT_RETRY_DELAY_MAX: Duration = Duration::from_secs(60 * 60);
pub(crate) const DEFAULT_EXPIRE_IN: Duration = Duration::from_secs(15 * 60);

// 2^30 seconds is already beyond any practical cap.
const MAX_BACKOFF_EXPONENT: usize = 30;

/// Durable job queue operations.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Declares a queue. Does nothing if the queue already exists.
    async fn create_queue(&self, opts: &QueueOptions<'_>) -> Result<(), Error>;

    /// Enqueues a job in state [`JobState::Created`] and returns its ID.
    async fn send_job(&self, job: &Job) -> Result<Uuid, Error>;

    /// Atomically claims up to `batch_size` due jobs, moving them to [`JobState::Active`].
    ///
    /// A job is due when it is `created` or `retry` and its `start_after` has passed.
    async fn fetch_jobs(&self, queue_name: &str, batch_size: usize)
        -> Result<Vec<ActiveJob>, Error>;

    /// Marks an active job as completed.
    ///
    /// Returns `false` if there is no such active job, e.g. it has already been completed.
    async fn complete_job(&self, queue_name: &str, job_id: Uuid) -> Result<bool, Error>;

    /// Marks an active job as failed.
    ///
    /// Retryable failures of jobs with retries left go to [`JobState::Retry`],
    /// everything else goes to [`JobState::Failed`]. Returns the new state, or
    /// `None` if there is no such active job.
    async fn fail_job(
        &self,
        queue_name: &str,
        job_id: Uuid,
        error: &str,
        retryable: bool,
    ) -> Result<Option<JobState>, Error>;

    /// Gets this job's details without claiming it.
    async fn get_job(&self, queue_name: &str, job_id: Uuid) -> Result<Option<ActiveJob>, Error>;

    /// Returns active jobs whose lease has run out back to the queue.
    ///
    /// Such a job counts one retry, or fails for good if it has none left.
    async fn expire_jobs(&self, queue_name: &str) -> Result<Vec<(Uuid, JobState)>, Error>;
}

/// Delay before the next run of a job that has failed `retry_count` times so far.
///
/// `jitter` is expected in `[0, 1)`; it stretches the delay by up to a half, which
/// never overtakes the next step, so consecutive delays do not decrease.
pub(crate) fn retry_delay(job: &ActiveJob, jitter: f64) -> Duration {
    if !job.retry_backoff {
        return job.retry_delay;
    }
    let exp = job.retry_count.min(MAX_BACKOFF_EXPONENT) as i32;
    let secs = job.retry_delay.as_secs_f64() * 2f64.powi(exp) * (1.0 + jitter.clamp(0.0, 1.0) / 2.0);
    Duration::from_secs_f64(secs.min(job.retry_delay_max.as_secs_f64()))
}
