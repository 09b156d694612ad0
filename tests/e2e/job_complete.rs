use crate::utils;
use pgmailer::JobState;
use serde_json::json;

#[tokio::test]
async fn complete_active_job_once() {
    let local = "complete_active_job_once";
    let c = utils::client_with_queue(local, "send-email").await;

    let id = c.send_data("send-email", json!({})).await.unwrap();

    // only active jobs can be completed
    assert!(!c.complete_job("send-email", id).await.unwrap());

    c.fetch_job("send-email").await.unwrap().unwrap();
    assert!(c.complete_job("send-email", id).await.unwrap());
    assert!(!c.complete_job("send-email", id).await.unwrap());

    let job = c.get_job("send-email", id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert!(job.completed_at.is_some());
    assert!(c.fetch_job("send-email").await.unwrap().is_none());
    utils::drop_schema(local).await.unwrap();
}
