use super::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use std::time::Duration;

/// Queue configuration.
///
/// These act as defaults for the jobs sent to this queue, each job
/// can still override them.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueOptions<'a> {
    /// Queue name.
    pub name: &'a str,

    /// Number of retry attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_limit: Option<usize>,

    /// Time to wait before a retry attempt.
    #[serde(
        serialize_with = "utils::serialize_duration_as_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_delay: Option<Duration>,

    /// Whether to use a backoff between retry attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_backoff: Option<bool>,

    /// Upper bound for the retry delay.
    #[serde(
        serialize_with = "utils::serialize_duration_as_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_delay_max: Option<Duration>,

    /// Time after which a claimed job is considered abandoned.
    ///
    /// Should be between 1 second and 24 hours, or simply unset (default).
    #[serde(
        serialize_with = "utils::serialize_duration_as_secs",
        rename = "expireInSeconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub expire_in: Option<Duration>,
}

/// Job queue info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueInfo {
    /// Queue name.
    pub name: String,

    /// Number of retry attempts.
    pub retry_limit: Option<usize>,

    /// Time to wait before a retry attempt.
    pub retry_delay: Option<Duration>,

    /// Whether to use a backoff between retry attempts.
    pub retry_backoff: Option<bool>,

    /// Upper bound for the retry delay.
    pub retry_delay_max: Option<Duration>,

    /// Lease duration for claimed jobs.
    pub expire_in: Option<Duration>,

    /// Date and time when this queue was created.
    pub created_at: DateTime<Utc>,

    /// Date and time when this queue was updated.
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for QueueInfo {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        let name: String = row.try_get("name")?;
        let retry_limit: Option<usize> =
            row.try_get("retry_limit")
                .and_then(|v: Option<i32>| match v {
                    None => Ok(None),
                    Some(v) if v >= 0 => Ok(Some(v as usize)),
                    Some(_) => Err(sqlx::Error::ColumnDecode {
                        index: "retry_limit".to_string(),
                        source: "'retry_limit' should be non-negative".into(),
                    }),
                })?;
        let retry_delay = utils::secs_from_column("retry_delay", row.try_get("retry_delay")?)?;
        let retry_backoff: Option<bool> = row.try_get("retry_backoff")?;
        let retry_delay_max =
            utils::secs_from_column("retry_delay_max", row.try_get("retry_delay_max")?)?;
        let expire_in =
            utils::secs_from_column("expire_seconds", row.try_get("expire_seconds")?)?;
        let created_at: DateTime<Utc> = row.try_get("created_on")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_on")?;
        Ok(QueueInfo {
            name,
            retry_limit,
            retry_delay,
            retry_backoff,
            retry_delay_max,
            expire_in,
            created_at,
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_serialize_for_the_store() {
        let opts = QueueOptions {
            name: "send-email",
            retry_limit: Some(3),
            retry_delay: Some(Duration::from_secs(30)),
            retry_backoff: Some(true),
            retry_delay_max: None,
            expire_in: Some(Duration::from_secs(600)),
        };
        let v = serde_json::to_value(&opts).unwrap();
        assert_eq!(v["retryLimit"], 3);
        assert_eq!(v["retryDelay"], 30);
        assert_eq!(v["retryBackoff"], true);
        assert_eq!(v["expireInSeconds"], 600);
        assert!(v.get("retryDelayMax").is_none());
    }
}
