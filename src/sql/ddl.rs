use crate::job::JobState;
use crate::store;

pub(crate) fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {};", schema)
}

// Order of the labels is what makes `state < 'active'` select claimable jobs.
pub(super) fn create_job_state_enum(schema: &str) -> String {
    format!(
        "
        DO $$
        BEGIN
            IF NOT EXISTS (SELECT 1 FROM pg_type typ INNER JOIN pg_namespace nsp on (typ.typnamespace = nsp.oid) where typ.typname = 'job_state' AND nsp.nspname = '{schema}') THEN
                CREATE TYPE {schema}.job_state AS ENUM ('{}', '{}', '{}', '{}', '{}');
            END IF;
        END $$;
        ",
        JobState::Created,
        JobState::Retry,
        JobState::Active,
        JobState::Completed,
        JobState::Failed,
    )
}

pub(super) fn create_version_table(schema: &str) -> String {
    format!(
        "
        CREATE TABLE IF NOT EXISTS {schema}.version (
            version int primary key,
            maintained_on timestamptz
        );
        "
    )
}

pub(super) fn create_queue_table(schema: &str) -> String {
    format!(
        "
        CREATE TABLE IF NOT EXISTS {schema}.queue (
            name text,
            retry_limit int,
            retry_delay int,
            retry_backoff bool,
            retry_delay_max int,
            expire_seconds int,
            created_on timestamptz not null default now(),
            updated_on timestamptz not null default now(),
            PRIMARY KEY (name)
        );
        "
    )
}

pub(super) fn create_job_table(schema: &str) -> String {
    format!(
        "
        CREATE TABLE IF NOT EXISTS {schema}.job (
            id uuid not null default gen_random_uuid(),
            name text not null REFERENCES {schema}.queue (name) ON DELETE CASCADE,
            data jsonb,
            state {schema}.job_state not null default('{0}'),
            retry_limit integer not null default({2}),
            retry_count integer not null default(0),
            retry_delay integer not null default({3}),
            retry_backoff boolean not null default {4},
            retry_delay_max integer not null default({5}),
            expire_seconds integer not null default({6}),
            start_after timestamptz not null default now(),
            started_on timestamptz,
            created_on timestamptz not null default now(),
            completed_on timestamptz,
            last_error text,
            CONSTRAINT job_pkey PRIMARY KEY (id),
            CONSTRAINT job_retry_count_check CHECK (retry_count <= retry_limit)
        );
        CREATE INDEX IF NOT EXISTS job_i1 ON {schema}.job (name, state, start_after);
        CREATE INDEX IF NOT EXISTS job_i2 ON {schema}.job (name, started_on) WHERE state = '{1}';
        ",
        JobState::Created,                        // 0
        JobState::Active,                         // 1
        store::DEFAULT_RETRY_LIMIT,               // 2
        store::DEFAULT_RETRY_DELAY.as_secs(),     // 3
        store::DEFAULT_RETRY_BACKOFF,             // 4
        store::DEFAULT_RETRY_DELAY_MAX.as_secs(), // 5
        store::DEFAULT_EXPIRE_IN.as_secs(),       // 6
    )
}
