use crate::{app::App, sql, Error};
use sqlx::postgres::PgPool;
use std::sync::Arc;

mod builder;
mod opts;
mod public;

pub use builder::ClientBuilder;

/// PostgreSQL-backed queue client.
///
/// Cheap to clone: clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    pool: PgPool,
    opts: opts::ClientOptions,
    stmt: Arc<sql::Statements>,
}

impl Client {
    async fn new(pool: PgPool, opts: opts::ClientOptions) -> Result<Self, Error> {
        let stmt = Arc::new(sql::Statements::for_schema(&opts.schema));
        let c = Client { pool, opts, stmt };
        c.start().await?;
        Ok(c)
    }

    async fn install_app(&self) -> Result<(), Error> {
        let ddl = sql::install_app(&self.opts.schema);
        sqlx::raw_sql(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    async fn maybe_existing_app(&self) -> Result<Option<App>, Error> {
        let stmt = sql::dml::check_if_app_installed(&self.opts.schema);
        let installed: bool = sqlx::query_scalar(&stmt).fetch_one(&self.pool).await?;
        if !installed {
            return Ok(None);
        }
        let stmt = sql::dml::get_app(&self.opts.schema);
        let app: Option<App> = sqlx::query_as(&stmt).fetch_optional(&self.pool).await?;
        Ok(app)
    }
}
