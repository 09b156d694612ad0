use crate::utils;
use pgmailer::{Job, JobState};
use serde_json::json;

#[tokio::test]
async fn expired_lease_returns_job_to_queue() {
    let local = "expired_lease_returns_job_to_queue";
    let c = utils::client_with_queue(local, "send-email").await;

    let job = Job::builder().queue_name("send-email").retry_limit(1).build();
    let id = c.send_job(job).await.unwrap();
    let other = c.send_data("send-email", json!({})).await.unwrap();

    c.fetch_jobs("send-email", 2).await.unwrap();
    assert!(c.expire_jobs("send-email").await.unwrap().is_empty());

    // as if the worker holding it died long ago
    let backdate = |id| {
        format!(
            "UPDATE {local}.job SET started_on = now() - interval '1 day' WHERE id = '{id}';"
        )
    };
    utils::ad_hoc_sql([backdate(id)]).await.unwrap();

    let expired = c.expire_jobs("send-email").await.unwrap();
    assert_eq!(expired, vec![(id, JobState::Retry)]);
    let job = c.get_job("send-email", id).await.unwrap().unwrap();
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.last_error.as_deref(), Some("job lease expired"));

    // untouched lease stays active
    let job = c.get_job("send-email", other).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Active);

    // out of retries the second time round
    assert_eq!(c.fetch_job("send-email").await.unwrap().unwrap().id, id);
    utils::ad_hoc_sql([backdate(id)]).await.unwrap();
    let expired = c.expire_jobs("send-email").await.unwrap();
    assert_eq!(expired, vec![(id, JobState::Failed)]);
    utils::drop_schema(local).await.unwrap();
}
