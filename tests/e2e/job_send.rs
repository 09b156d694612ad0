use crate::utils;
use pgmailer::{Error, Job, JobState};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn send_job_with_defaults_and_overrides() {
    let local = "send_job_with_defaults_and_overrides";
    let c = utils::client_with_queue(local, "send-email").await;

    let id = c
        .send_data("send-email", json!({"to": "bob@example.com"}))
        .await
        .unwrap();
    let job = c.get_job("send-email", id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Created);
    assert_eq!(job.retry_limit, 2);
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.data, json!({"to": "bob@example.com"}));
    assert!(job.started_at.is_none());

    let job_id = Uuid::new_v4();
    let job = Job::builder()
        .id(job_id)
        .queue_name("send-email")
        .data(json!({"n": 2}))
        .retry_limit(7)
        .retry_delay(Duration::from_secs(15))
        .retry_backoff(true)
        .expire_in(Duration::from_secs(60))
        .build();
    assert_eq!(c.send_job(&job).await.unwrap(), job_id);
    let job = c.get_job("send-email", job_id).await.unwrap().unwrap();
    assert_eq!(job.retry_limit, 7);
    assert_eq!(job.retry_delay, Duration::from_secs(15));
    assert!(job.retry_backoff);
    assert_eq!(job.expire_in, Duration::from_secs(60));

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn send_job_with_taken_id_conflicts() {
    let local = "send_job_with_taken_id_conflicts";
    let c = utils::client_with_queue(local, "send-email").await;

    let job = Job::builder()
        .id(Uuid::new_v4())
        .queue_name("send-email")
        .build();
    c.send_job(&job).await.unwrap();
    let err = c.send_job(&job).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn send_job_to_missing_queue() {
    let local = "send_job_to_missing_queue";
    let c = utils::client_with_queue(local, "send-email").await;

    let err = c.send_data("nowhere", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::DoesNotExist { .. }));

    utils::drop_schema(local).await.unwrap();
}
