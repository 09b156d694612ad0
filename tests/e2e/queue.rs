use crate::utils::{self, POSRGRES_URL};
use pgmailer::{Client, QueueOptions};
use std::time::Duration;

#[tokio::test]
async fn create_get_and_delete_queue() {
    let local = "create_get_and_delete_queue";
    utils::drop_schema(local).await.unwrap();
    let c = Client::builder()
        .schema(local)
        .connect_to(POSRGRES_URL.as_str())
        .await
        .unwrap();

    assert!(c.get_queue("send-email").await.unwrap().is_none());

    c.create_queue(QueueOptions {
        name: "send-email",
        retry_limit: Some(5),
        retry_delay: Some(Duration::from_secs(10)),
        retry_backoff: Some(true),
        expire_in: Some(Duration::from_secs(120)),
        ..Default::default()
    })
    .await
    .unwrap();
    c.create_standard_queue("digest").await.unwrap();

    let q = c.get_queue("send-email").await.unwrap().unwrap();
    assert_eq!(q.name, "send-email");
    assert_eq!(q.retry_limit, Some(5));
    assert_eq!(q.retry_delay, Some(Duration::from_secs(10)));
    assert_eq!(q.retry_backoff, Some(true));
    assert_eq!(q.expire_in, Some(Duration::from_secs(120)));

    let names: Vec<String> = c
        .get_queues()
        .await
        .unwrap()
        .into_iter()
        .map(|q| q.name)
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"digest".to_string()));

    c.delete_queue("digest").await.unwrap();
    assert!(c.get_queue("digest").await.unwrap().is_none());
    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn create_queue_is_idempotent() {
    let local = "create_queue_is_idempotent";
    let c = utils::client_with_queue(local, "send-email").await;

    // the second declaration does not overwrite the first one
    c.create_queue(QueueOptions {
        name: "send-email",
        retry_limit: Some(9),
        ..Default::default()
    })
    .await
    .unwrap();
    let q = c.get_queue("send-email").await.unwrap().unwrap();
    assert_ne!(q.retry_limit, Some(9));
    assert_eq!(c.get_queues().await.unwrap().len(), 1);
    utils::drop_schema(local).await.unwrap();
}
