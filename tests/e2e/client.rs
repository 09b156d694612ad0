use crate::utils::{self, POSRGRES_URL};
use chrono::Utc;
use pgmailer::{Client, Error};
use sqlx::postgres::PgPoolOptions;

#[tokio::test]
async fn connect_to() {
    let local = "connect_to";
    utils::drop_schema(local).await.unwrap();
    let c = Client::builder()
        .schema(local)
        .connect_to(POSRGRES_URL.as_str())
        .await
        .unwrap();
    assert_eq!(c.schema(), local);
    c.stop().await;
    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn bring_your_own_pool() {
    let local = "bring_your_own_pool";
    utils::drop_schema(local).await.unwrap();
    let p = PgPoolOptions::new()
        .max_connections(1)
        .connect(POSRGRES_URL.as_str())
        .await
        .unwrap();
    let c = Client::builder().schema(local).with_pool(p).await.unwrap();
    c.create_standard_queue("emails").await.unwrap();
    assert!(c.get_queue("emails").await.unwrap().is_some());
    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn instantiated_idempotently() {
    let local = "instantiated_idempotently";
    utils::drop_schema(local).await.unwrap();

    // as if N worker replicas were booting at once
    let mut js = tokio::task::JoinSet::new();
    for _ in 0..20 {
        js.spawn(async move {
            Client::builder()
                .schema(local)
                .connect_to(POSRGRES_URL.as_str())
                .await
                .unwrap();
        });
    }
    while let Some(res) = js.join_next().await {
        res.unwrap()
    }

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn installed_schema_is_reused() {
    let local = "installed_schema_is_reused";
    utils::drop_schema(local).await.unwrap();

    let c = Client::builder()
        .schema(local)
        .connect_to(POSRGRES_URL.as_str())
        .await
        .unwrap();
    c.create_standard_queue("emails").await.unwrap();
    let id = c.send_data("emails", serde_json::json!({"n": 1})).await.unwrap();

    // restart keeps both the queue and its jobs
    c.start().await.unwrap();
    let job = c.get_job("emails", id).await.unwrap().unwrap();
    assert_eq!(job.data["n"], 1);
    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn outdated_schema_is_rejected() {
    let local = "outdated_schema_is_rejected";
    utils::drop_schema(local).await.unwrap();

    utils::ad_hoc_sql([
        format!("CREATE SCHEMA {local};"),
        format!(
            "CREATE TABLE {local}.version (version int primary key, maintained_on timestamptz);"
        ),
        format!("INSERT INTO {local}.version VALUES (0, '{}');", Utc::now()),
    ])
    .await
    .unwrap();

    let err = Client::builder()
        .schema(local)
        .connect_to(POSRGRES_URL.as_str())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }));
    utils::drop_schema(local).await.unwrap();
}
