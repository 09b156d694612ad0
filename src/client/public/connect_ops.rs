use super::Client;
use crate::client::opts;
use crate::utils;
use crate::Error;
use sqlx::postgres::PgPool;

#[cfg(doc)]
use crate::ClientBuilder;

impl Client {
    /// Create new [`Client`] and connect to a PostgreSQL server.
    ///
    /// If `url` is not given, `DATABASE_URL` is read. If that is not set either,
    /// `POSTGRES_PROVIDER` is read to get the name of the environment variable
    /// to get the address from (defaults to `POSTGRES_URL`), and then that environment variable is read
    /// to get the server address. If the latter environment variable is not defined, the connection will be
    /// made to `postgres://localhost:5432`.
    ///
    /// You can optionally use [`Client::connect_to`] and pass the `url` as an argument.
    pub async fn connect() -> Result<Client, Error> {
        let pool = utils::create_pool(None).await?;
        Client::with_pool(pool).await
    }

    /// Connect to the PostgreSQL server using specific url.
    ///
    /// To configure `ssl` (e.g. `sslmode=require`), you will need to build
    /// your own `Pool` and use [`ClientBuilder::with_pool`] method instead.
    pub async fn connect_to<U>(url: U) -> Result<Client, Error>
    where
        U: AsRef<str>,
    {
        let pool = utils::create_pool(Some(url.as_ref())).await?;
        Client::with_pool(pool).await
    }

    /// Bring your own pool.
    pub async fn with_pool(pool: PgPool) -> Result<Self, Error> {
        let opts = opts::ClientOptions::default();
        Client::new(pool, opts).await
    }

    /// Make sure the schema is installed.
    ///
    /// Every constructor already calls this. It is safe to call again and from
    /// many processes at once: the installation runs under an advisory lock and
    /// only creates what is missing. Queues do not need to exist beforehand.
    pub async fn start(&self) -> Result<(), Error> {
        if let Some(app) = self.maybe_existing_app().await? {
            tracing::debug!(
                schema = %self.opts.schema,
                version = app.version,
                maintained_on = ?app.maintained_on,
                "queue schema already installed"
            );
            if app.version < crate::MINIMUM_SUPPORTED_APP_VERSION as i32 {
                return Err(Error::Unsupported {
                    msg: format!(
                        "cannot migrate from installed schema version {} (minimum supported is {})",
                        app.version,
                        crate::MINIMUM_SUPPORTED_APP_VERSION
                    ),
                });
            }
        }
        self.install_app().await
    }

    /// Close the connection pool.
    ///
    /// Waits for checked out connections to be returned first, so call this
    /// once in-flight jobs are done.
    pub async fn stop(&self) {
        self.pool.close().await;
        tracing::info!(schema = %self.opts.schema, "queue store connections closed");
    }
}
