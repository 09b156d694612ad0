use sqlx::postgres::{PgConnectOptions, PgPool};

use super::{opts, Client};
use crate::utils;
use crate::Error;

/// Builder for [`Client`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    schema: String,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder {
            schema: crate::DEFAULT_SCHEMA.to_string(),
        }
    }
}

impl ClientBuilder {
    /// Schema name.
    pub fn schema<S>(mut self, schema: S) -> Self
    where
        S: Into<String>,
    {
        self.schema = schema.into();
        self
    }

    /// Connect to the PostgreSQL server.
    ///
    /// See [`Client::connect`] on how the server address is resolved.
    pub async fn connect(self) -> Result<Client, Error> {
        let pool = utils::create_pool(None).await?;
        self.with_pool(pool).await
    }

    /// Connect to the PostgreSQL server using specific url.
    ///
    /// To configure `ssl` (e.g. `sslmode=require`), you will need to build
    /// your own `Pool` and use [`ClientBuilder::with_pool`] method instead.
    pub async fn connect_to<S>(self, url: S) -> Result<Client, Error>
    where
        S: AsRef<str>,
    {
        let pool = utils::create_pool(Some(url.as_ref())).await?;
        self.with_pool(pool).await
    }

    /// Connect using these connection options.
    pub async fn connect_with(self, opts: PgConnectOptions) -> Result<Client, Error> {
        let pool = utils::create_pool_with(opts).await?;
        self.with_pool(pool).await
    }

    /// Bring your own pool.
    pub async fn with_pool(self, pool: PgPool) -> Result<Client, Error> {
        let opts = opts::ClientOptions {
            schema: self.schema,
        };
        Client::new(pool, opts).await
    }
}
