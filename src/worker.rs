//! Worker pool.
//!
//! One loop per registered queue claims due jobs, never holding more than
//! [`WorkerConfig::concurrency`] of them at a time, and runs each one through
//! its queue's [`Handler`]. Every outcome, panics included, ends in a
//! `complete` or `fail` call on the store.

use crate::config::WorkerConfig;
use crate::job::{ActiveJob, JobState};
use crate::store::JobStore;
use crate::Error;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

const MAX_LOOP_BACKOFF: Duration = Duration::from_secs(30);
const ACK_ATTEMPTS: u32 = 3;
const ACK_BACKOFF: Duration = Duration::from_millis(500);

/// Outcome of a failed job run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    /// Whether running the job again later may succeed.
    pub retryable: bool,
    pub message: String,
}

impl HandlerError {
    pub fn retryable<M: fmt::Display>(message: M) -> Self {
        Self {
            retryable: true,
            message: message.to_string(),
        }
    }

    /// A failure that will not go away, e.g. a malformed payload.
    pub fn fatal<M: fmt::Display>(message: M) -> Self {
        Self {
            retryable: false,
            message: message.to_string(),
        }
    }
}

/// Processes jobs of one kind.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, job: &ActiveJob) -> Result<(), HandlerError>;
}

/// Asks a running [`Worker`] to stop.
///
/// The worker stops claiming, lets in-flight jobs finish and then returns from [`Worker::run`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

struct Registration {
    queue_name: String,
    handler: Arc<dyn Handler>,
}

pub struct Worker<S> {
    store: Arc<S>,
    config: WorkerConfig,
    registrations: Vec<Registration>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl<S> fmt::Debug for Worker<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .field(
                "queues",
                &self
                    .registrations
                    .iter()
                    .map(|r| r.queue_name.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl<S> Worker<S>
where
    S: JobStore,
{
    pub fn new(store: Arc<S>, config: WorkerConfig) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            store,
            config,
            registrations: Vec::new(),
            shutdown: Arc::new(tx),
        }
    }

    /// Process jobs of `queue_name` with `handler`.
    pub fn register<Q, H>(mut self, queue_name: Q, handler: H) -> Self
    where
        Q: Into<String>,
        H: Handler,
    {
        self.registrations.push(Registration {
            queue_name: queue_name.into(),
            handler: Arc::new(handler),
        });
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown),
        }
    }

    /// Drains the registered queues until shut down.
    pub async fn run(self) {
        let mut loops = JoinSet::new();
        for registration in &self.registrations {
            let queue = QueueLoop {
                store: Arc::clone(&self.store),
                config: self.config.clone(),
                queue_name: registration.queue_name.clone(),
                handler: Arc::clone(&registration.handler),
            };
            loops.spawn(queue.run(self.shutdown.subscribe()));
        }
        tracing::info!(
            queues = self.registrations.len(),
            concurrency = self.config.concurrency,
            "worker started"
        );
        while let Some(res) = loops.join_next().await {
            if let Err(e) = res {
                tracing::error!(error = %e, "queue loop aborted");
            }
        }
        tracing::info!("worker stopped");
    }

    /// Claims one batch from `queue_name` and processes it to the end.
    ///
    /// Returns the number of jobs processed.
    pub async fn run_once(&self, queue_name: &str) -> Result<usize, Error> {
        let handler = self
            .registrations
            .iter()
            .find(|r| r.queue_name == queue_name)
            .map(|r| Arc::clone(&r.handler))
            .ok_or(Error::DoesNotExist {
                msg: "no handler registered for this queue",
            })?;
        let jobs = self
            .store
            .fetch_jobs(queue_name, self.config.concurrency)
            .await?;
        let count = jobs.len();
        let mut in_flight = JoinSet::new();
        for job in jobs {
            in_flight.spawn(process(
                Arc::clone(&self.store),
                Arc::clone(&handler),
                job,
                None,
            ));
        }
        while in_flight.join_next().await.is_some() {}
        Ok(count)
    }
}

struct QueueLoop<S> {
    store: Arc<S>,
    config: WorkerConfig,
    queue_name: String,
    handler: Arc<dyn Handler>,
}

impl<S> QueueLoop<S>
where
    S: JobStore,
{
    fn loop_backoff(&self, consecutive_errors: u32) -> Duration {
        self.config
            .poll_interval
            .max(Duration::from_millis(100))
            .saturating_mul(2u32.saturating_pow(consecutive_errors.min(5)))
            .min(MAX_LOOP_BACKOFF)
    }

    async fn sweep(&self) {
        match self.store.expire_jobs(&self.queue_name).await {
            Ok(expired) => {
                for (job_id, state) in expired {
                    tracing::warn!(
                        queue = %self.queue_name,
                        %job_id,
                        %state,
                        error = crate::store::LEASE_EXPIRED,
                        "reclaimed abandoned job"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(queue = %self.queue_name, error = %e, "lease sweep failed");
            }
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut in_flight = JoinSet::new();
        let mut consecutive_errors: u32 = 0;
        let mut last_sweep: Option<Instant> = None;

        tracing::info!(queue = %self.queue_name, "polling queue");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if last_sweep.map_or(true, |at| at.elapsed() >= self.config.maintenance_interval) {
                self.sweep().await;
                last_sweep = Some(Instant::now());
            }

            while in_flight.try_join_next().is_some() {}

            let free = semaphore.available_permits();
            if free == 0 {
                tokio::select! {
                    _ = in_flight.join_next() => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }

            let delay = match self.store.fetch_jobs(&self.queue_name, free).await {
                Ok(jobs) => {
                    if consecutive_errors > 0 {
                        tracing::info!(
                            queue = %self.queue_name,
                            consecutive_errors,
                            "store reachable again"
                        );
                        consecutive_errors = 0;
                    }
                    if !jobs.is_empty() {
                        tracing::debug!(queue = %self.queue_name, count = jobs.len(), "claimed jobs");
                        for job in jobs {
                            let permit = Arc::clone(&semaphore).acquire_owned().await.ok();
                            in_flight.spawn(process(
                                Arc::clone(&self.store),
                                Arc::clone(&self.handler),
                                job,
                                permit,
                            ));
                        }
                        continue;
                    }
                    self.config.poll_interval
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    let delay = self.loop_backoff(consecutive_errors);
                    if e.is_store_unavailable() {
                        tracing::warn!(
                            queue = %self.queue_name,
                            error = %e,
                            consecutive_errors,
                            ?delay,
                            "store unavailable, backing off"
                        );
                    } else {
                        tracing::error!(queue = %self.queue_name, error = %e, ?delay, "failed to claim jobs");
                    }
                    delay
                }
            };

            tokio::select! {
                _ = shutdown.changed() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if !in_flight.is_empty() {
            tracing::info!(queue = %self.queue_name, in_flight = in_flight.len(), "waiting for in-flight jobs");
        }
        while in_flight.join_next().await.is_some() {}
        tracing::info!(queue = %self.queue_name, "queue loop stopped");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

/// Runs one job to a final `complete` or `fail` call.
///
/// The handler runs in its own task so a panic stays contained in it.
async fn process<S>(
    store: Arc<S>,
    handler: Arc<dyn Handler>,
    job: ActiveJob,
    _permit: Option<OwnedSemaphorePermit>,
) where
    S: JobStore + ?Sized,
{
    let job_id = job.id;
    let queue_name = job.queue_name.clone();
    let attempt = job.retry_count + 1;

    let outcome = tokio::spawn(async move { handler.handle(&job).await }).await;
    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(e) if e.is_panic() => Some(HandlerError::retryable(panic_message(&*e.into_panic()))),
        Err(e) => Some(HandlerError::retryable(format!("handler task failed: {e}"))),
    };

    for ack_attempt in 1..=ACK_ATTEMPTS {
        let acked = match &failure {
            None => store.complete_job(&queue_name, job_id).await.map(|done| {
                if done {
                    tracing::info!(queue = %queue_name, %job_id, attempt, state = %JobState::Completed, "job completed");
                } else {
                    tracing::warn!(queue = %queue_name, %job_id, "job was no longer active when completing");
                }
            }),
            Some(failure) => store
                .fail_job(&queue_name, job_id, &failure.message, failure.retryable)
                .await
                .map(|state| match state {
                    Some(state) => tracing::warn!(
                        queue = %queue_name,
                        %job_id,
                        attempt,
                        %state,
                        retryable = failure.retryable,
                        error = %failure.message,
                        "job failed"
                    ),
                    None => tracing::warn!(queue = %queue_name, %job_id, error = %failure.message, "job was no longer active when failing"),
                }),
        };
        match acked {
            Ok(()) => return,
            Err(e) if ack_attempt < ACK_ATTEMPTS => {
                tracing::warn!(queue = %queue_name, %job_id, error = %e, "could not record job outcome, retrying");
                tokio::time::sleep(ACK_BACKOFF * ack_attempt).await;
            }
            Err(e) => {
                // the lease sweeper hands the job out again
                tracing::error!(queue = %queue_name, %job_id, error = %e, "could not record job outcome");
            }
        }
    }
}
