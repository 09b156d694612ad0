use clap::Parser;
use pgmailer::delivery::SmtpTransport;
use pgmailer::{
    Client, Config, DeliveryClient, EmailHandler, QueueOptions, Worker, SEND_EMAIL_QUEUE,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SMOKE_TEST_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(version, about = "Drains the send-email queue and delivers messages over SMTP.", long_about = None)]
struct Cli {
    /// Exit successfully shortly after the worker has started.
    #[arg(long)]
    smoke_test: bool,

    /// Additional queues to serve with the email handler.
    #[arg(short, long = "queue")]
    queues: Vec<String>,
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM, only Ctrl+C will stop the worker");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::from_env()?;
    config.worker.smoke_test |= cli.smoke_test;

    let client = Client::builder()
        .schema(config.schema.as_str())
        .connect_to(&config.database_url)
        .await?;

    let mut queues = vec![SEND_EMAIL_QUEUE.to_string()];
    for queue in cli.queues {
        if !queues.contains(&queue) {
            queues.push(queue);
        }
    }
    for queue in &queues {
        client
            .create_queue(QueueOptions {
                name: queue,
                ..Default::default()
            })
            .await?;
    }

    let transport = SmtpTransport::new(config.smtp.clone())?;
    let handler = EmailHandler::new(&config.email, DeliveryClient::new(transport, config.send));

    let client = Arc::new(client);
    let mut worker = Worker::new(Arc::clone(&client), config.worker.clone());
    for queue in &queues {
        worker = worker.register(queue.as_str(), handler.clone());
    }
    let shutdown = worker.shutdown_handle();
    let running = tokio::spawn(worker.run());

    if config.worker.smoke_test {
        tokio::time::sleep(SMOKE_TEST_GRACE).await;
        tracing::info!("smoke test passed, shutting down");
    } else {
        wait_for_signal().await;
        tracing::info!("shutdown requested, finishing in-flight jobs");
    }
    shutdown.shutdown();
    running.await?;

    client.stop().await;
    Ok(())
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
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "worker failed");
            ExitCode::FAILURE
        }
    }
}
