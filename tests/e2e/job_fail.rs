use crate::utils;
use chrono::Utc;
use pgmailer::{Job, JobState};
use std::time::Duration;

#[tokio::test]
async fn fail_job_until_retries_run_out() {
    let local = "fail_job_until_retries_run_out";
    let c = utils::client_with_queue(local, "send-email").await;

    let job = Job::builder()
        .queue_name("send-email")
        .retry_limit(1)
        .retry_delay(Duration::ZERO)
        .build();
    let id = c.send_job(job).await.unwrap();

    c.fetch_job("send-email").await.unwrap().unwrap();
    let state = c.fail_job("send-email", id, "smtp timeout", true).await.unwrap();
    assert_eq!(state, Some(JobState::Retry));

    let job = c.get_job("send-email", id).await.unwrap().unwrap();
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.last_error.as_deref(), Some("smtp timeout"));

    // zero retry delay makes it due right away
    let job = c.fetch_job("send-email").await.unwrap().unwrap();
    assert_eq!(job.id, id);
    let state = c.fail_job("send-email", id, "smtp timeout", true).await.unwrap();
    assert_eq!(state, Some(JobState::Failed));

    let job = c.get_job("send-email", id).await.unwrap().unwrap();
    assert_eq!(job.retry_count, 1);
    assert!(job.completed_at.is_some());
    assert!(c.fetch_job("send-email").await.unwrap().is_none());
    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn non_retryable_failure_is_final() {
    let local = "non_retryable_failure_is_final";
    let c = utils::client_with_queue(local, "send-email").await;

    let job = Job::builder().queue_name("send-email").retry_limit(5).build();
    let id = c.send_job(job).await.unwrap();

    // nothing to fail before the job is claimed
    assert_eq!(c.fail_job("send-email", id, "bad", false).await.unwrap(), None);

    c.fetch_job("send-email").await.unwrap().unwrap();
    let state = c.fail_job("send-email", id, "invalid address", false).await.unwrap();
    assert_eq!(state, Some(JobState::Failed));
    assert_eq!(c.get_job("send-email", id).await.unwrap().unwrap().retry_count, 0);
    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn failed_job_is_rescheduled_with_backoff() {
    let local = "failed_job_is_rescheduled_with_backoff";
    let c = utils::client_with_queue(local, "send-email").await;

    let job = Job::builder()
        .queue_name("send-email")
        .retry_limit(3)
        .retry_delay(Duration::from_secs(60))
        .retry_backoff(true)
        .build();
    let id = c.send_job(job).await.unwrap();
    c.fetch_job("send-email").await.unwrap().unwrap();

    let before = Utc::now();
    c.fail_job("send-email", id, "421 try later", true).await.unwrap();
    let job = c.get_job("send-email", id).await.unwrap().unwrap();

    // first retry waits delay * 2^0 * (1 + jitter/2), jitter in [0, 1)
    let wait = (job.start_after - before).num_seconds();
    assert!((58..=92).contains(&wait), "waits {wait}s");
    assert!(c.fetch_job("send-email").await.unwrap().is_none());
    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn default_queue_backs_off() {
    let local = "default_queue_backs_off";
    let c = utils::client_with_queue(local, "send-email").await;

    let id = c.send_job(Job::builder().queue_name("send-email").build()).await.unwrap();
    let job = c.fetch_job("send-email").await.unwrap().unwrap();
    assert_eq!(job.retry_delay, Duration::from_secs(1));
    assert!(job.retry_backoff);

    let before = Utc::now();
    let state = c.fail_job("send-email", id, "421 try later", true).await.unwrap();
    assert_eq!(state, Some(JobState::Retry));
    let job = c.get_job("send-email", id).await.unwrap().unwrap();
    assert!(job.start_after - before >= chrono::Duration::milliseconds(900));
    assert!(c.fetch_job("send-email").await.unwrap().is_none());
    utils::drop_schema(local).await.unwrap();
}
