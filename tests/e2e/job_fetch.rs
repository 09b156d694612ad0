use crate::utils;
use chrono::{Duration as TimeDelta, Utc};
use pgmailer::{Job, JobState};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn fetch_jobs_in_order() {
    let local = "fetch_jobs_in_order";
    let c = utils::client_with_queue(local, "send-email").await;

    assert!(c.fetch_job("send-email").await.unwrap().is_none());

    let first = c.send_data("send-email", json!({"n": 1})).await.unwrap();
    let second = c.send_data("send-email", json!({"n": 2})).await.unwrap();

    let job = c.fetch_job("send-email").await.unwrap().unwrap();
    assert_eq!(job.id, first);
    assert_eq!(job.state, JobState::Active);
    assert!(job.started_at.is_some());

    let jobs = c.fetch_jobs("send-email", 10).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, second);

    // active jobs are not handed out again
    assert!(c.fetch_jobs("send-email", 10).await.unwrap().is_empty());
    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn deferred_job_is_not_due() {
    let local = "deferred_job_is_not_due";
    let c = utils::client_with_queue(local, "send-email").await;

    let job = Job::builder()
        .queue_name("send-email")
        .start_after(Utc::now() + TimeDelta::hours(1))
        .build();
    let id = c.send_job(job).await.unwrap();
    assert!(c.fetch_job("send-email").await.unwrap().is_none());

    // due as soon as start_after is in the past
    utils::ad_hoc_sql([format!(
        "UPDATE {local}.job SET start_after = now() - interval '1s' WHERE id = '{id}';"
    )])
    .await
    .unwrap();
    assert_eq!(c.fetch_job("send-email").await.unwrap().unwrap().id, id);
    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn concurrent_claims_are_exclusive() {
    let local = "concurrent_claims_are_exclusive";
    let c = Arc::new(utils::client_with_queue(local, "send-email").await);

    let mut sent = HashSet::new();
    for n in 0..100 {
        sent.insert(c.send_data("send-email", json!({ "n": n })).await.unwrap());
    }

    let mut js = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let c = Arc::clone(&c);
        js.spawn(async move {
            let mut claimed = Vec::new();
            loop {
                let jobs = c.fetch_jobs("send-email", 3).await.unwrap();
                if jobs.is_empty() {
                    break claimed;
                }
                claimed.extend(jobs.into_iter().map(|j| j.id));
            }
        });
    }

    let mut claimed = HashSet::new();
    let mut total = 0;
    while let Some(res) = js.join_next().await {
        let ids = res.unwrap();
        total += ids.len();
        claimed.extend(ids);
    }
    assert_eq!(total, 100);
    assert_eq!(claimed, sent);
    utils::drop_schema(local).await.unwrap();
}
