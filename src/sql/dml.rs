use crate::job::JobState;
use crate::store;

fn job_columns(alias: &str) -> String {
    format!(
        "{alias}.id, {alias}.name, {alias}.data, {alias}.state::text as state, \
        {alias}.retry_limit, {alias}.retry_count, {alias}.retry_delay, {alias}.retry_backoff, \
        {alias}.retry_delay_max, {alias}.expire_seconds, {alias}.start_after, {alias}.started_on, \
        {alias}.created_on, {alias}.completed_on, {alias}.last_error"
    )
}

pub(crate) fn check_if_app_installed(schema: &str) -> String {
    format!(
        "
        SELECT EXISTS (
            SELECT 1 FROM information_schema.tables WHERE table_schema = '{schema}' AND table_name = 'version'
        );
        "
    )
}

pub(crate) fn get_app(schema: &str) -> String {
    format!("SELECT version, maintained_on FROM {schema}.version ORDER BY version DESC LIMIT 1;")
}

pub(crate) fn insert_version(schema: &str, version: u8) -> String {
    format!(
        "INSERT INTO {schema}.version (version) VALUES ({}) ON CONFLICT DO NOTHING;",
        version
    )
}

pub(crate) fn create_queue(schema: &str) -> String {
    format!(
        r#"
        INSERT INTO {schema}.queue (
            name,
            retry_limit,
            retry_delay,
            retry_backoff,
            retry_delay_max,
            expire_seconds
        )
        SELECT
            $1,
            (o->>'retryLimit')::int,
            (o->>'retryDelay')::int,
            (o->>'retryBackoff')::bool,
            (o->>'retryDelayMax')::int,
            (o->>'expireInSeconds')::int
        FROM (SELECT $2::jsonb AS o) opts
        ON CONFLICT DO NOTHING;
        "#
    )
}

pub(crate) fn get_queue(schema: &str) -> String {
    format!(
        "
        SELECT
            name,
            retry_limit,
            retry_delay,
            retry_backoff,
            retry_delay_max,
            expire_seconds,
            created_on,
            updated_on
        FROM {schema}.queue
        WHERE name = $1;
        "
    )
}

pub(crate) fn get_queues(schema: &str) -> String {
    format!(
        "
        SELECT
            name,
            retry_limit,
            retry_delay,
            retry_backoff,
            retry_delay_max,
            expire_seconds,
            created_on,
            updated_on
        FROM {schema}.queue;
        "
    )
}

pub(crate) fn delete_queue(schema: &str) -> String {
    format!("DELETE FROM {schema}.queue WHERE name = $1;")
}

/// Inserts a job, taking unset options from the queue and then from the system defaults.
///
/// Yields no rows when the queue does not exist.
pub(crate) fn create_job(schema: &str) -> String {
    format!(
        r#"
        INSERT INTO {schema}.job (
            id,
            name,
            data,
            retry_limit,
            retry_delay,
            retry_backoff,
            retry_delay_max,
            expire_seconds,
            start_after
        )
        SELECT
            COALESCE($1, gen_random_uuid()),
            q.name,
            $3,
            COALESCE($4, q.retry_limit, {0}),
            COALESCE($5, q.retry_delay, {1}),
            COALESCE($6, q.retry_backoff, {2}),
            COALESCE($7, q.retry_delay_max, {3}),
            COALESCE($8, q.expire_seconds, {4}),
            COALESCE($9, now())
        FROM {schema}.queue q
        WHERE q.name = $2
        RETURNING id;
        "#,
        store::DEFAULT_RETRY_LIMIT,               // 0
        store::DEFAULT_RETRY_DELAY.as_secs(),     // 1
        store::DEFAULT_RETRY_BACKOFF,             // 2
        store::DEFAULT_RETRY_DELAY_MAX.as_secs(), // 3
        store::DEFAULT_EXPIRE_IN.as_secs(),       // 4
    )
}

pub(crate) fn get_job(schema: &str) -> String {
    format!(
        "SELECT {} FROM {schema}.job j WHERE j.name = $1 AND j.id = $2;",
        job_columns("j")
    )
}

/// Claims up to `$2` due jobs from queue `$1`.
///
/// Rows locked by a concurrent claim are skipped rather than waited for, so
/// two claimants can never walk away with the same job.
pub(crate) fn fetch_jobs(schema: &str) -> String {
    format!(
        r#"
        WITH next AS (
            SELECT id FROM {schema}.job
            WHERE name = $1 AND state < '{0}' AND start_after <= now()
            ORDER BY created_on, id
            LIMIT $2
            FOR UPDATE
            SKIP LOCKED
        )
        UPDATE {schema}.job j SET
            state = '{0}',
            started_on = now()
        FROM next
        WHERE j.name = $1 AND j.id = next.id
        RETURNING {1};
        "#,
        JobState::Active, // 0
        job_columns("j"), // 1
    )
}

pub(crate) fn complete_job(schema: &str) -> String {
    format!(
        r#"
        WITH results AS (
            UPDATE {schema}.job SET
                state = '{0}',
                completed_on = now()
            WHERE name = $1 AND id = $2 AND state = '{1}'
            RETURNING 1
        )
        SELECT COUNT(*) FROM results;
        "#,
        JobState::Completed, // 0
        JobState::Active,    // 1
    )
}

/// Fails an active job.
///
/// `$4` tells whether the failure is retryable at all. The retry delay is
/// `retry_delay * 2^(retry_count) * (1 + jitter / 2)` capped by `retry_delay_max`
/// when backoff is on, which keeps consecutive delays non-decreasing.
/// Returns the state the job transitioned to.
pub(crate) fn fail_job(schema: &str) -> String {
    format!(
        r#"
        WITH results AS (
            UPDATE {schema}.job SET
                state = CASE WHEN $4 AND retry_count < retry_limit THEN '{0}'::{schema}.job_state ELSE '{1}'::{schema}.job_state END,
                retry_count = CASE WHEN $4 AND retry_count < retry_limit THEN retry_count + 1 ELSE retry_count END,
                completed_on = CASE WHEN $4 AND retry_count < retry_limit THEN NULL ELSE now() END,
                start_after = CASE
                    WHEN NOT ($4 AND retry_count < retry_limit) THEN start_after
                    WHEN NOT retry_backoff THEN now() + retry_delay * interval '1s'
                    ELSE now() + LEAST(
                        retry_delay_max::float8,
                        retry_delay * 2 ^ LEAST(30, retry_count) * (1 + random() / 2)
                    ) * interval '1s'
                    END,
                last_error = $3
            WHERE name = $1 AND id = $2 AND state = '{2}'
            RETURNING state::text AS state
        )
        SELECT state FROM results;
        "#,
        JobState::Retry,  // 0
        JobState::Failed, // 1
        JobState::Active, // 2
    )
}

/// Returns jobs in queue `$1` whose lease ran out back to the queue.
pub(crate) fn expire_jobs(schema: &str) -> String {
    format!(
        r#"
        WITH results AS (
            UPDATE {schema}.job SET
                state = CASE WHEN retry_count < retry_limit THEN '{0}'::{schema}.job_state ELSE '{1}'::{schema}.job_state END,
                retry_count = CASE WHEN retry_count < retry_limit THEN retry_count + 1 ELSE retry_count END,
                completed_on = CASE WHEN retry_count < retry_limit THEN NULL ELSE now() END,
                start_after = now(),
                last_error = '{3}'
            WHERE name = $1 AND state = '{2}' AND started_on + expire_seconds * interval '1s' < now()
            RETURNING id, state::text AS state
        ), maintained AS (
            UPDATE {schema}.version SET maintained_on = now()
        )
        SELECT id, state FROM results;
        "#,
        JobState::Retry,              // 0
        JobState::Failed,             // 1
        JobState::Active,             // 2
        crate::store::LEASE_EXPIRED,  // 3
    )
}
