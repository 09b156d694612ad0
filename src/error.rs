use thiserror::Error;

/// Enumerates all errors the queue may return.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Sqlx PostgreSQL driver error.
    #[error("db driver error")]
    Sqlx(#[from] sqlx::Error),

    /// Application error.
    #[error("cannot process: {msg}")]
    Unprocessable {
        /// Details on what exactly went wrong.
        msg: &'static str,
    },

    /// Constraint violation in the system.
    #[error("conflict in the system: {msg}")]
    Conflict {
        /// Details on what exactly went wrong.
        msg: &'static str,
    },

    /// Entity referenced by the operation does not exist.
    #[error("does not exist: {msg}")]
    DoesNotExist {
        /// Details on what exactly went wrong.
        msg: &'static str,
    },

    /// The schema found in the database cannot be upgraded by this version.
    #[error("unsupported installation: {msg}")]
    Unsupported {
        /// Details on what exactly went wrong.
        msg: String,
    },
}

impl Error {
    /// Whether the store itself could not be reached or failed to answer.
    ///
    /// The worker treats these as a reason to back off the whole poll loop,
    /// rather than as a problem with any particular job.
    pub fn is_store_unavailable(&self) -> bool {
        match self {
            Error::Sqlx(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Protocol(_)
            ),
            _ => false,
        }
    }
}
