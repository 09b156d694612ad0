use std::fmt::Debug;

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Row of the `version` relation describing the installed schema.
#[derive(Debug, Clone, Default, FromRow)]
pub(crate) struct App {
    pub(crate) version: i32,
    pub(crate) maintained_on: Option<DateTime<Utc>>,
}
