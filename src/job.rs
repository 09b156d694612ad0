use crate::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use std::time::Duration;
use uuid::Uuid;

/// Job's state.
///
/// The order of the variants matters: everything "less than" [`JobState::Active`]
/// is eligible for claiming, everything "greater than" it is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting to be claimed for the first time.
    #[default]
    Created,
    /// Failed at least once and is waiting for its next run.
    Retry,
    /// Claimed by a worker.
    Active,
    /// Processed successfully.
    Completed,
    /// Failed with no retries left or with a non-retryable error.
    Failed,
}

impl JobState {
    /// Whether this job will never be claimed again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl TryFrom<String> for JobState {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "created" => Ok(Self::Created),
            "retry" => Ok(Self::Retry),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unsupported job state: {}", other)),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Retry => "retry",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A job to be sent to the queue.
///
/// Options left unset fall back to the queue's options, and then to the
/// system defaults: 2 retries, no delay, no backoff, 1 hour backoff cap,
/// and a 15 minutes lease.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job's ID, generated by the store if not given.
    pub id: Option<Uuid>,

    /// Name of the queue to put this job into.
    pub queue_name: String,

    /// Job's payload.
    pub data: serde_json::Value,

    /// Number of retry attempts.
    pub retry_limit: Option<usize>,

    /// Time to wait before a retry attempt, one second unless the job or its queue says otherwise.
    pub retry_delay: Option<Duration>,

    /// Whether to grow the retry delay exponentially. On unless the job or its queue turns it off.
    pub retry_backoff: Option<bool>,

    /// Upper bound for the retry delay when backoff is on.
    pub retry_delay_max: Option<Duration>,

    /// For how long a worker may hold this job before it is considered abandoned.
    pub expire_in: Option<Duration>,

    /// Do not hand this job out before this moment.
    pub start_after: Option<DateTime<Utc>>,
}

impl Job {
    /// Create an instance of [`JobBuilder`].
    pub fn builder() -> JobBuilder {
        JobBuilder::default()
    }
}

/// Builder for [`Job`].
#[derive(Debug, Clone, Default)]
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    /// ID to assign to the job.
    pub fn id(mut self, id: Uuid) -> Self {
        self.job.id = Some(id);
        self
    }

    /// Name of the queue to send the job to.
    pub fn queue_name<S>(mut self, name: S) -> Self
    where
        S: Into<String>,
    {
        self.job.queue_name = name.into();
        self
    }

    /// Job's payload.
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.job.data = data;
        self
    }

    /// Number of retry attempts.
    pub fn retry_limit(mut self, value: usize) -> Self {
        self.job.retry_limit = Some(value);
        self
    }

    /// Time to wait before a retry attempt.
    pub fn retry_delay(mut self, value: Duration) -> Self {
        self.job.retry_delay = Some(value);
        self
    }

    /// Whether to use exponential backoff between retry attempts.
    pub fn retry_backoff(mut self, value: bool) -> Self {
        self.job.retry_backoff = Some(value);
        self
    }

    /// Cap for the retry delay.
    pub fn retry_delay_max(mut self, value: Duration) -> Self {
        self.job.retry_delay_max = Some(value);
        self
    }

    /// Lease duration for this job once claimed.
    pub fn expire_in(mut self, value: Duration) -> Self {
        self.job.expire_in = Some(value);
        self
    }

    /// Earliest moment the job may be claimed.
    pub fn start_after(mut self, value: DateTime<Utc>) -> Self {
        self.job.start_after = Some(value);
        self
    }

    /// Defer the job by this much from now.
    pub fn delay_for(self, value: Duration) -> Self {
        self.start_after(Utc::now() + value)
    }

    /// Creates a job.
    pub fn build(self) -> Job {
        self.job
    }
}

/// A job as recorded by the store, including its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveJob {
    /// Job's ID.
    pub id: Uuid,

    /// Name of the queue this job belongs to.
    pub queue_name: String,

    /// Job's payload.
    pub data: serde_json::Value,

    /// Job's current state.
    pub state: JobState,

    /// Maximum number of retries.
    pub retry_limit: usize,

    /// Number of retries performed so far.
    pub retry_count: usize,

    /// Base delay between retries.
    pub retry_delay: Duration,

    /// Whether backoff is applied to `retry_delay`.
    pub retry_backoff: bool,

    /// Cap for the retry delay.
    pub retry_delay_max: Duration,

    /// Lease duration once claimed.
    pub expire_in: Duration,

    /// Earliest moment the job may be claimed (next run for jobs in `retry`).
    pub start_after: DateTime<Utc>,

    /// When the job was last claimed.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,

    /// Error recorded by the latest failure.
    pub last_error: Option<String>,
}

impl FromRow<'_, PgRow> for ActiveJob {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        let id: Uuid = row.try_get("id")?;
        let queue_name: String = row.try_get("name")?;
        let data: Option<serde_json::Value> = row.try_get("data")?;
        let state: JobState = row.try_get("state").and_then(|v: String| {
            JobState::try_from(v).map_err(|e| sqlx::Error::ColumnDecode {
                index: "state".to_string(),
                source: e.into(),
            })
        })?;
        let retry_limit = non_negative("retry_limit", row.try_get("retry_limit")?)?;
        let retry_count = non_negative("retry_count", row.try_get("retry_count")?)?;
        let retry_delay = utils::secs_from_column("retry_delay", row.try_get("retry_delay")?)?
            .unwrap_or_default();
        let retry_backoff: bool = row.try_get("retry_backoff")?;
        let retry_delay_max =
            utils::secs_from_column("retry_delay_max", row.try_get("retry_delay_max")?)?
                .unwrap_or_default();
        let expire_in = utils::secs_from_column("expire_seconds", row.try_get("expire_seconds")?)?
            .unwrap_or_default();
        Ok(ActiveJob {
            id,
            queue_name,
            data: data.unwrap_or_default(),
            state,
            retry_limit,
            retry_count,
            retry_delay,
            retry_backoff,
            retry_delay_max,
            expire_in,
            start_after: row.try_get("start_after")?,
            started_at: row.try_get("started_on")?,
            created_at: row.try_get("created_on")?,
            completed_at: row.try_get("completed_on")?,
            last_error: row.try_get("last_error")?,
        })
    }
}

fn non_negative(index: &str, value: i32) -> sqlx::Result<usize> {
    usize::try_from(value).map_err(|_| sqlx::Error::ColumnDecode {
        index: index.to_string(),
        source: format!("'{}' should be non-negative", index).into(),
    })
}
