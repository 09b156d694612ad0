use super::{
    retry_delay, JobStore, DEFAULT_EXPIRE_IN, DEFAULT_RETRY_BACKOFF, DEFAULT_RETRY_DELAY,
    DEFAULT_RETRY_DELAY_MAX, DEFAULT_RETRY_LIMIT, LEASE_EXPIRED,
};
use crate::job::{ActiveJob, Job, JobState};
use crate::queue::{QueueInfo, QueueOptions};
use crate::Error;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, QueueInfo>,
    jobs: HashMap<Uuid, ActiveJob>,
}

/// In-process [`JobStore`].
///
/// Claims are serialized by one mutex, which gives the same "at most one claimant"
/// guarantee as the PostgreSQL store, but only within this process and only
/// for as long as the process lives. Handy for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns info on all the queues declared in this store.
    pub fn queues(&self) -> Vec<QueueInfo> {
        self.lock().queues.values().cloned().collect()
    }

    /// Returns all jobs of this queue, in no particular order.
    pub fn jobs(&self, queue_name: &str) -> Vec<ActiveJob> {
        self.lock()
            .jobs
            .values()
            .filter(|j| j.queue_name == queue_name)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a panic while holding the lock cannot leave a job half-updated,
        // every mutation below is a single assignment sequence
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_queue(&self, opts: &QueueOptions<'_>) -> Result<(), Error> {
        let mut state = self.lock();
        let now = Utc::now();
        state
            .queues
            .entry(opts.name.to_string())
            .or_insert_with(|| QueueInfo {
                name: opts.name.to_string(),
                retry_limit: opts.retry_limit,
                retry_delay: opts.retry_delay,
                retry_backoff: opts.retry_backoff,
                retry_delay_max: opts.retry_delay_max,
                expire_in: opts.expire_in,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn send_job(&self, job: &Job) -> Result<Uuid, Error> {
        let mut state = self.lock();
        let queue = state
            .queues
            .get(&job.queue_name)
            .ok_or(Error::DoesNotExist {
                msg: "queue does not exist",
            })?;
        let id = job.id.unwrap_or_else(Uuid::new_v4);
        let now = Utc::now();
        let record = ActiveJob {
            id,
            queue_name: job.queue_name.clone(),
            data: job.data.clone(),
            state: JobState::Created,
            retry_limit: job
                .retry_limit
                .or(queue.retry_limit)
                .unwrap_or(DEFAULT_RETRY_LIMIT),
            retry_count: 0,
            retry_delay: job
                .retry_delay
                .or(queue.retry_delay)
                .unwrap_or(DEFAULT_RETRY_DELAY),
            retry_backoff: job
                .retry_backoff
                .or(queue.retry_backoff)
                .unwrap_or(DEFAULT_RETRY_BACKOFF),
            retry_delay_max: job
                .retry_delay_max
                .or(queue.retry_delay_max)
                .unwrap_or(DEFAULT_RETRY_DELAY_MAX),
            expire_in: job.expire_in.or(queue.expire_in).unwrap_or(DEFAULT_EXPIRE_IN),
            start_after: job.start_after.unwrap_or(now),
            started_at: None,
            created_at: now,
            completed_at: None,
            last_error: None,
        };
        if state.jobs.contains_key(&id) {
            return Err(Error::Conflict {
                msg: "job with this id already exists",
            });
        }
        state.jobs.insert(id, record);
        Ok(id)
    }

    async fn fetch_jobs(
        &self,
        queue_name: &str,
        batch_size: usize,
    ) -> Result<Vec<ActiveJob>, Error> {
        let mut state = self.lock();
        let now = Utc::now();
        let mut due: Vec<(chrono::DateTime<Utc>, Uuid)> = state
            .jobs
            .values()
            .filter(|j| {
                j.queue_name == queue_name && j.state < JobState::Active && j.start_after <= now
            })
            .map(|j| (j.created_at, j.id))
            .collect();
        due.sort();
        due.truncate(batch_size);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            if let Some(job) = state.jobs.get_mut(&id) {
                job.state = JobState::Active;
                job.started_at = Some(now);
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete_job(&self, queue_name: &str, job_id: Uuid) -> Result<bool, Error> {
        let mut state = self.lock();
        match state.jobs.get_mut(&job_id) {
            Some(job) if job.queue_name == queue_name && job.state == JobState::Active => {
                job.state = JobState::Completed;
                job.completed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_job(
        &self,
        queue_name: &str,
        job_id: Uuid,
        error: &str,
        retryable: bool,
    ) -> Result<Option<JobState>, Error> {
        let mut state = self.lock();
        let job = match state.jobs.get_mut(&job_id) {
            Some(job) if job.queue_name == queue_name && job.state == JobState::Active => job,
            _ => return Ok(None),
        };
        let now = Utc::now();
        if retryable && job.retry_count < job.retry_limit {
            let delay = retry_delay(job, rand::random::<f64>());
            job.state = JobState::Retry;
            job.retry_count += 1;
            job.completed_at = None;
            job.start_after = now
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        } else {
            job.state = JobState::Failed;
            job.completed_at = Some(now);
        }
        job.last_error = Some(error.to_string());
        Ok(Some(job.state))
    }

    async fn get_job(&self, queue_name: &str, job_id: Uuid) -> Result<Option<ActiveJob>, Error> {
        Ok(self
            .lock()
            .jobs
            .get(&job_id)
            .filter(|j| j.queue_name == queue_name)
            .cloned())
    }

    async fn expire_jobs(&self, queue_name: &str) -> Result<Vec<(Uuid, JobState)>, Error> {
        let mut state = self.lock();
        let now = Utc::now();
        let mut expired = Vec::new();
        for job in state.jobs.values_mut() {
            if job.queue_name != queue_name || job.state != JobState::Active {
                continue;
            }
            let lease = chrono::Duration::from_std(job.expire_in)
                .unwrap_or_else(|_| chrono::Duration::zero());
            match job.started_at {
                Some(started_at) if started_at + lease < now => {}
                _ => continue,
            }
            if job.retry_count < job.retry_limit {
                job.state = JobState::Retry;
                job.retry_count += 1;
                job.completed_at = None;
            } else {
                job.state = JobState::Failed;
                job.completed_at = Some(now);
            }
            job.start_after = now;
            job.last_error = Some(LEASE_EXPIRED.to_string());
            expired.push((job.id, job.state));
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    const QNAME: &str = "send-email";

    async fn prepare() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_queue(&QueueOptions {
                name: QNAME,
                ..Default::default()
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn create_queue_is_idempotent() {
        let store = prepare().await;
        store
            .create_queue(&QueueOptions {
                name: QNAME,
                retry_limit: Some(10),
                ..Default::default()
            })
            .await
            .unwrap();
        let queues = store.queues();
        assert_eq!(queues.len(), 1);
        // first declaration wins
        assert_eq!(queues[0].retry_limit, None);
    }

    #[tokio::test]
    async fn send_job_queue_does_not_exist() {
        let store = MemoryStore::new();
        let job = Job::builder().queue_name("jobtype").build();
        if let Error::DoesNotExist { msg } = store.send_job(&job).await.unwrap_err() {
            assert_eq!(msg, "queue does not exist");
        } else {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn send_job_with_id_conflict() {
        let store = prepare().await;
        let id = Uuid::new_v4();
        let job = Job::builder().queue_name(QNAME).id(id).build();
        assert_eq!(store.send_job(&job).await.unwrap(), id);
        assert!(matches!(
            store.send_job(&job).await.unwrap_err(),
            Error::Conflict { .. }
        ));
    }

    #[tokio::test]
    async fn deferred_job_is_not_claimed_early() {
        let store = prepare().await;
        let job = Job::builder()
            .queue_name(QNAME)
            .delay_for(Duration::from_secs(60))
            .build();
        store.send_job(&job).await.unwrap();
        assert!(store.fetch_jobs(QNAME, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn complete_job_only_once() {
        let store = prepare().await;
        let id = store
            .send_job(&Job::builder().queue_name(QNAME).data(json!({})).build())
            .await
            .unwrap();

        // cannot complete what has not been claimed
        assert!(!store.complete_job(QNAME, id).await.unwrap());

        let claimed = store.fetch_jobs(QNAME, 1).await.unwrap();
        assert_eq!(claimed[0].id, id);
        assert_eq!(claimed[0].state, JobState::Active);
        assert!(claimed[0].started_at.is_some());

        assert!(store.complete_job(QNAME, id).await.unwrap());
        assert!(!store.complete_job(QNAME, id).await.unwrap());

        let info = store.get_job(QNAME, id).await.unwrap().unwrap();
        assert_eq!(info.state, JobState::Completed);
        assert!(info.completed_at.is_some());
        assert!(store.fetch_jobs(QNAME, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn two_claimants_one_job() {
        let store = Arc::new(prepare().await);
        let id = store
            .send_job(&Job::builder().queue_name(QNAME).build())
            .await
            .unwrap();

        let (a, b) = tokio::join!(store.fetch_jobs(QNAME, 1), store.fetch_jobs(QNAME, 1));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.len() + b.len(), 1);
        let winner = a.into_iter().chain(b).next().unwrap();
        assert_eq!(winner.id, id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claimants_never_share_a_job() {
        let store = Arc::new(prepare().await);
        for _ in 0..200 {
            store
                .send_job(&Job::builder().queue_name(QNAME).build())
                .await
                .unwrap();
        }

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            set.spawn(async move {
                let mut mine = Vec::new();
                loop {
                    let batch = store.fetch_jobs(QNAME, 3).await.unwrap();
                    if batch.is_empty() {
                        return mine;
                    }
                    mine.extend(batch.into_iter().map(|j| j.id));
                    tokio::task::yield_now().await;
                }
            });
        }

        let mut seen = HashSet::new();
        while let Some(res) = set.join_next().await {
            for id in res.unwrap() {
                assert!(seen.insert(id), "job {} was claimed twice", id);
            }
        }
        assert_eq!(seen.len(), 200);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let store = prepare().await;
        let id = store
            .send_job(
                &Job::builder()
                    .queue_name(QNAME)
                    .retry_limit(3)
                    .retry_delay(Duration::ZERO)
                    .build(),
            )
            .await
            .unwrap();

        let mut claims = 0;
        loop {
            let batch = store.fetch_jobs(QNAME, 1).await.unwrap();
            let Some(job) = batch.into_iter().next() else {
                break;
            };
            claims += 1;
            store.fail_job(QNAME, job.id, "smtp down", true).await.unwrap();
        }

        // one initial run plus three retries
        assert_eq!(claims, 4);
        let info = store.get_job(QNAME, id).await.unwrap().unwrap();
        assert_eq!(info.state, JobState::Failed);
        assert_eq!(info.retry_count, 3);
        assert_eq!(info.last_error.as_deref(), Some("smtp down"));
        assert!(store.fetch_jobs(QNAME, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_retryable_failure_is_terminal() {
        let store = prepare().await;
        let id = store
            .send_job(&Job::builder().queue_name(QNAME).retry_limit(5).build())
            .await
            .unwrap();
        store.fetch_jobs(QNAME, 1).await.unwrap();
        let state = store.fail_job(QNAME, id, "bad payload", false).await.unwrap();
        assert_eq!(state, Some(JobState::Failed));
        let info = store.get_job(QNAME, id).await.unwrap().unwrap();
        assert_eq!(info.retry_count, 0);
        assert!(store.fetch_jobs(QNAME, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_waits_for_backoff() {
        let store = prepare().await;
        let id = store
            .send_job(
                &Job::builder()
                    .queue_name(QNAME)
                    .retry_delay(Duration::from_secs(30))
                    .retry_backoff(true)
                    .build(),
            )
            .await
            .unwrap();
        store.fetch_jobs(QNAME, 1).await.unwrap();
        let before = Utc::now();
        assert_eq!(
            store.fail_job(QNAME, id, "timeout", true).await.unwrap(),
            Some(JobState::Retry)
        );
        let info = store.get_job(QNAME, id).await.unwrap().unwrap();
        assert_eq!(info.retry_count, 1);
        assert!(info.start_after >= before + chrono::Duration::seconds(30));
        assert!(store.fetch_jobs(QNAME, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn default_queue_backs_off_between_retries() {
        let store = prepare().await;
        let id = store
            .send_job(&Job::builder().queue_name(QNAME).build())
            .await
            .unwrap();

        let job = store.fetch_jobs(QNAME, 1).await.unwrap().pop().unwrap();
        assert_eq!(job.retry_delay, DEFAULT_RETRY_DELAY);
        assert!(job.retry_backoff);

        let before = Utc::now();
        assert_eq!(
            store.fail_job(QNAME, id, "421 try later", true).await.unwrap(),
            Some(JobState::Retry)
        );
        let info = store.get_job(QNAME, id).await.unwrap().unwrap();
        assert!(info.start_after >= before + chrono::Duration::seconds(1));
        assert!(store.fetch_jobs(QNAME, 1).await.unwrap().is_empty());

        // the second retry waits at least twice as long
        if let Some(job) = store.lock().jobs.get_mut(&id) {
            job.start_after = Utc::now();
        }
        store.fetch_jobs(QNAME, 1).await.unwrap().pop().unwrap();
        let before = Utc::now();
        store.fail_job(QNAME, id, "421 try later", true).await.unwrap();
        let info = store.get_job(QNAME, id).await.unwrap().unwrap();
        assert!(info.start_after >= before + chrono::Duration::seconds(2));
    }

    #[tokio::test]
    async fn abandoned_job_is_reclaimable() {
        let store = prepare().await;
        let id = store
            .send_job(
                &Job::builder()
                    .queue_name(QNAME)
                    .retry_limit(1)
                    .expire_in(Duration::ZERO)
                    .build(),
            )
            .await
            .unwrap();
        store.fetch_jobs(QNAME, 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(
            store.expire_jobs(QNAME).await.unwrap(),
            vec![(id, JobState::Retry)]
        );
        let job = store.fetch_jobs(QNAME, 1).await.unwrap().pop().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.last_error.as_deref(), Some(LEASE_EXPIRED));

        // no retries left this time around
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(
            store.expire_jobs(QNAME).await.unwrap(),
            vec![(id, JobState::Failed)]
        );
    }
}
