use serde::Serializer;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::time::Duration;

const MAX_POOL_CONNECTIONS: u32 = 10;

pub(crate) fn database_url_from_env() -> String {
    crate::config::database_url(crate::config::process_env)
}

pub(crate) async fn create_pool(url: Option<&str>) -> Result<PgPool, sqlx::Error> {
    let url = match url {
        Some(url) => url.to_string(),
        None => database_url_from_env(),
    };
    PgPoolOptions::new()
        .max_connections(MAX_POOL_CONNECTIONS)
        .connect(&url)
        .await
}

pub(crate) async fn create_pool_with(opts: PgConnectOptions) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(MAX_POOL_CONNECTIONS)
        .connect_with(opts)
        .await
}

pub(crate) fn serialize_duration_as_secs<S>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        None => serializer.serialize_none(),
        Some(d) => serializer.serialize_u64(d.as_secs()),
    }
}

pub(crate) fn secs_from_column(
    index: &str,
    value: Option<i32>,
) -> Result<Option<Duration>, sqlx::Error> {
    match value {
        None => Ok(None),
        Some(v) if v >= 0 => Ok(Some(Duration::from_secs(v as u64))),
        Some(_) => Err(sqlx::Error::ColumnDecode {
            index: index.to_string(),
            source: format!("'{}' should be non-negative", index).into(),
        }),
    }
}
