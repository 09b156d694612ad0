pub(crate) mod ddl;
pub(crate) mod dml;

fn locked<I>(schema: &str, stmts: I) -> String
where
    I: IntoIterator<Item = String>,
{
    format!(
        "
        BEGIN;
        SET LOCAL lock_timeout = '30s';
        SET LOCAL idle_in_transaction_session_timeout = '30s';
        SELECT pg_advisory_xact_lock(('x' || encode(sha224((current_database() || '.pgmailer.{schema}')::bytea), 'hex'))::bit(64)::bigint);
        {};
        COMMIT;
        ",
        stmts.into_iter().collect::<Vec<_>>().join("\n"),
    )
}

///
/// \d
///```md
/// List of relations
/// Schema   |  Name   | Type  |  Owner
/// ---------+---------+-------+----------
/// pgmailer | job     | table | postgres
/// pgmailer | queue   | table | postgres
/// pgmailer | version | table | postgres
/// (3 rows)
/// ```
///
pub(crate) fn install_app(schema: &str) -> String {
    locked(
        schema,
        [
            ddl::create_schema(schema),
            ddl::create_job_state_enum(schema),
            ddl::create_version_table(schema),
            ddl::create_queue_table(schema),
            ddl::create_job_table(schema),
            dml::insert_version(schema, crate::CURRENT_APP_VERSION),
        ],
    )
}

/// Statements compiled once per client, since they only depend on the schema name.
#[derive(Debug, Clone)]
pub(crate) struct Statements {
    pub(crate) create_queue: String,
    pub(crate) get_queue: String,
    pub(crate) get_queues: String,
    pub(crate) delete_queue: String,
    pub(crate) create_job: String,
    pub(crate) get_job: String,
    pub(crate) fetch_jobs: String,
    pub(crate) complete_job: String,
    pub(crate) fail_job: String,
    pub(crate) expire_jobs: String,
}

impl Statements {
    pub(crate) fn for_schema(schema: &str) -> Self {
        Statements {
            create_queue: dml::create_queue(schema),
            get_queue: dml::get_queue(schema),
            get_queues: dml::get_queues(schema),
            delete_queue: dml::delete_queue(schema),
            create_job: dml::create_job(schema),
            get_job: dml::get_job(schema),
            fetch_jobs: dml::fetch_jobs(schema),
            complete_job: dml::complete_job(schema),
            fail_job: dml::fail_job(schema),
            expire_jobs: dml::expire_jobs(schema),
        }
    }
}
