use clap::Parser;
use pgmailer::{enqueue_email, Client, EmailJob, Error, SEND_EMAIL_QUEUE};
use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::{atomic, Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

lazy_static::lazy_static! {
    static ref SCHEMA_NAME: String = format!("loadtest_{}", uuid::Uuid::new_v4().as_simple());
}

#[derive(Parser)]
#[command(version, about = "Floods the email queue and drains it with competing consumers.", long_about = None)]
struct Cli {
    /// Emails to enqueue.
    #[arg(short, long, default_value_t = 30_000)]
    jobs_count: usize,

    /// Producers and, separately, consumers to run.
    #[arg(short, long, default_value_t = 10)]
    threads_count: usize,

    /// Jobs a consumer claims at once.
    #[arg(short, long, default_value_t = 5)]
    batch_size: usize,

    /// Keep the queue and its jobs around for inspection.
    #[arg(long)]
    keep_jobs: bool,
}

#[derive(Default)]
struct Tally {
    sent: atomic::AtomicUsize,
    completed: atomic::AtomicUsize,
    claimed: Mutex<HashSet<uuid::Uuid>>,
    duplicates: atomic::AtomicUsize,
}

impl Tally {
    fn record_claim(&self, id: uuid::Uuid) {
        let fresh = match self.claimed.lock() {
            Ok(mut claimed) => claimed.insert(id),
            Err(poisoned) => poisoned.into_inner().insert(id),
        };
        if !fresh {
            self.duplicates.fetch_add(1, atomic::Ordering::SeqCst);
        }
    }
}

async fn produce(c: Arc<Client>, tally: Arc<Tally>, jobs_count: usize) -> Result<(), Error> {
    loop {
        let n = tally.sent.fetch_add(1, atomic::Ordering::SeqCst);
        if n >= jobs_count {
            tally.sent.fetch_sub(1, atomic::Ordering::SeqCst);
            return Ok(());
        }
        let email = EmailJob::new(format!("user{n}@example.com"), "Load test")
            .markdown(format!("# Hello\n\nThis is message **{n}**."))
            .with("footerText", "Load test");
        enqueue_email(c.as_ref(), SEND_EMAIL_QUEUE, &email).await?;
    }
}

async fn consume(
    c: Arc<Client>,
    tally: Arc<Tally>,
    jobs_count: usize,
    batch_size: usize,
) -> Result<(), Error> {
    while tally.completed.load(atomic::Ordering::SeqCst) < jobs_count {
        let jobs = c.fetch_jobs(SEND_EMAIL_QUEUE, batch_size).await?;
        if jobs.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
            continue;
        }
        for job in jobs {
            tally.record_claim(job.id);
            if c.complete_job(SEND_EMAIL_QUEUE, job.id).await? {
                tally.completed.fetch_add(1, atomic::Ordering::SeqCst);
            }
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<bool, Error> {
    tracing::info!(
        jobs_count = cli.jobs_count,
        threads_count = cli.threads_count,
        batch_size = cli.batch_size,
        schema = SCHEMA_NAME.as_str(),
        "starting load test"
    );

    let c = Arc::new(Client::builder().schema(SCHEMA_NAME.as_str()).connect().await?);
    c.create_standard_queue(SEND_EMAIL_QUEUE).await?;

    let tally = Arc::new(Tally::default());
    let start = std::time::Instant::now();

    let mut set = tokio::task::JoinSet::new();
    for _ in 0..cli.threads_count {
        set.spawn(produce(Arc::clone(&c), Arc::clone(&tally), cli.jobs_count));
        set.spawn(consume(
            Arc::clone(&c),
            Arc::clone(&tally),
            cli.jobs_count,
            cli.batch_size,
        ));
    }
    while let Some(res) = set.join_next().await {
        match res {
            Ok(result) => result?,
            Err(e) => tracing::error!(error = %e, "load test task crashed"),
        }
    }

    let seconds_elapsed = start.elapsed().as_secs_f64();
    let completed = tally.completed.load(atomic::Ordering::SeqCst);
    let duplicates = tally.duplicates.load(atomic::Ordering::SeqCst);
    tracing::info!(
        sent = tally.sent.load(atomic::Ordering::SeqCst),
        completed,
        duplicates,
        seconds = %format!("{seconds_elapsed:.2}"),
        rate = %format!("{:.0}", completed as f64 / seconds_elapsed),
        "load test finished"
    );

    if !cli.keep_jobs {
        c.delete_queue(SEND_EMAIL_QUEUE).await?;
    }
    c.stop().await;
    Ok(duplicates == 0 && completed == cli.jobs_count)
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            tracing::error!("some jobs were claimed twice or never completed");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "load test failed");
            ExitCode::FAILURE
        }
    }
}
