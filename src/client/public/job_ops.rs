use super::Client;
use crate::job::{ActiveJob, Job, JobState};
use crate::Error;
use std::borrow::Borrow;
use std::time::Duration;
use uuid::Uuid;

fn as_secs(value: Option<Duration>) -> Option<i32> {
    value.map(|d| i32::try_from(d.as_secs()).unwrap_or(i32::MAX))
}

fn as_count(value: Option<usize>) -> Option<i32> {
    value.map(|v| i32::try_from(v).unwrap_or(i32::MAX))
}

impl Client {
    /// Enqueue a job.
    ///
    /// Many producers can call this concurrently, each insert is independent.
    pub async fn send_job<J>(&self, job: J) -> Result<Uuid, Error>
    where
        J: Borrow<Job>,
    {
        let job = job.borrow();
        let id: Option<Uuid> = sqlx::query_scalar(&self.stmt.create_job)
            .bind(job.id)
            .bind(&job.queue_name)
            .bind(&job.data)
            .bind(as_count(job.retry_limit))
            .bind(as_secs(job.retry_delay))
            .bind(job.retry_backoff)
            .bind(as_secs(job.retry_delay_max))
            .bind(as_secs(job.expire_in))
            .bind(job.start_after)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if let Some(db_error) = e.as_database_error() {
                    if let Some(constraint) = db_error.constraint() {
                        if constraint == "job_pkey" {
                            return Error::Conflict {
                                msg: "job with this id already exists",
                            };
                        }
                    }
                }
                Error::Sqlx(e)
            })?;
        let id = id.ok_or(Error::DoesNotExist {
            msg: "queue does not exist",
        })?;
        tracing::debug!(queue = %job.queue_name, job_id = %id, state = %JobState::Created, "job enqueued");
        Ok(id)
    }

    /// Create and enqueue a job.
    pub async fn send_data<Q, D>(&self, queue_name: Q, data: D) -> Result<Uuid, Error>
    where
        Q: AsRef<str>,
        D: Borrow<serde_json::Value>,
    {
        let job = Job::builder()
            .queue_name(queue_name.as_ref())
            .data(data.borrow().clone())
            .build();
        self.send_job(job).await
    }

    /// Fetch a job from a queue.
    pub async fn fetch_job<Q>(&self, queue_name: Q) -> Result<Option<ActiveJob>, Error>
    where
        Q: AsRef<str>,
    {
        let maybe_job: Option<ActiveJob> = sqlx::query_as(&self.stmt.fetch_jobs)
            .bind(queue_name.as_ref())
            .bind(1i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(maybe_job)
    }

    /// Fetch a batch of jobs.
    ///
    /// Concurrent callers, in this or other processes, never receive the same job.
    pub async fn fetch_jobs<Q>(
        &self,
        queue_name: Q,
        batch_size: usize,
    ) -> Result<Vec<ActiveJob>, Error>
    where
        Q: AsRef<str>,
    {
        let jobs: Vec<ActiveJob> = sqlx::query_as(&self.stmt.fetch_jobs)
            .bind(queue_name.as_ref())
            .bind(i64::try_from(batch_size).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(jobs)
    }

    /// Get this job's details including metadata.
    ///
    /// Unlike [`Client::fetch_job`] _will not consume_ a job from the queue,
    /// rather will only get this job's details. Useful for monitoring, analyzing
    /// the execution progress, e.g. how many times this job has been retried or what
    /// error was recorded on its latest failure.
    pub async fn get_job<Q>(&self, queue_name: Q, job_id: Uuid) -> Result<Option<ActiveJob>, Error>
    where
        Q: AsRef<str>,
    {
        let maybe_job: Option<ActiveJob> = sqlx::query_as(&self.stmt.get_job)
            .bind(queue_name.as_ref())
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(maybe_job)
    }

    /// Mark a job as completed.
    ///
    /// Returns `false` if there is no _active_ job with this ID in the queue,
    /// which is also the case for a job completed earlier.
    pub async fn complete_job<Q>(&self, queue_name: Q, job_id: Uuid) -> Result<bool, Error>
    where
        Q: AsRef<str>,
    {
        let completed_count: (i64,) = sqlx::query_as(&self.stmt.complete_job)
            .bind(queue_name.as_ref())
            .bind(job_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(completed_count.0 == 1)
    }

    /// Mark a job as failed.
    ///
    /// If the failure is `retryable` and the job has retries left, it is scheduled
    /// for another run, otherwise it is failed for good. Returns the state the job
    /// ended up in, or `None` if there is no _active_ job with this ID in the queue.
    pub async fn fail_job<Q, E>(
        &self,
        queue_name: Q,
        job_id: Uuid,
        error: E,
        retryable: bool,
    ) -> Result<Option<JobState>, Error>
    where
        Q: AsRef<str>,
        E: AsRef<str>,
    {
        let state: Option<String> = sqlx::query_scalar(&self.stmt.fail_job)
            .bind(queue_name.as_ref())
            .bind(job_id)
            .bind(error.as_ref())
            .bind(retryable)
            .fetch_optional(&self.pool)
            .await?;
        state
            .map(|s| {
                JobState::try_from(s).map_err(|_| Error::Unprocessable {
                    msg: "unexpected job state returned by the store",
                })
            })
            .transpose()
    }

    /// Return jobs whose lease has expired back to the queue.
    ///
    /// Returns IDs of the affected jobs along with the state they transitioned to.
    pub async fn expire_jobs<Q>(&self, queue_name: Q) -> Result<Vec<(Uuid, JobState)>, Error>
    where
        Q: AsRef<str>,
    {
        let rows: Vec<(Uuid, String)> = sqlx::query_as(&self.stmt.expire_jobs)
            .bind(queue_name.as_ref())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|(id, state)| {
                JobState::try_from(state)
                    .map(|state| (id, state))
                    .map_err(|_| Error::Unprocessable {
                        msg: "unexpected job state returned by the store",
                    })
            })
            .collect()
    }
}
