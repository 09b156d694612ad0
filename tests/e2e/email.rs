use crate::utils;
use async_trait::async_trait;
use pgmailer::delivery::{Transport, TransportError};
use pgmailer::{
    enqueue_email, DeliveryClient, EmailDefaults, EmailHandler, EmailJob, JobState, Message,
    Receipt, SendPolicy, Worker, WorkerConfig, SEND_EMAIL_QUEUE,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct Outbox {
    sent: Arc<Mutex<Vec<Message>>>,
}

#[async_trait]
impl Transport for Outbox {
    async fn send(&self, message: &Message) -> Result<Receipt, TransportError> {
        if message.subject.contains("bounce") {
            return Err(TransportError::transient("550 mailbox unavailable"));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(Receipt {
            message_id: "<test@example.com>".to_string(),
            accepted: message.to.iter().map(|m| m.email.to_string()).collect(),
            response: "250 Ok".to_string(),
        })
    }
}

#[tokio::test]
async fn worker_delivers_enqueued_emails() {
    let local = "worker_delivers_enqueued_emails";
    let client = Arc::new(utils::client_with_queue(local, SEND_EMAIL_QUEUE).await);

    let welcome = EmailJob::new("bob@example.com", "Welcome")
        .markdown("# Hi\n\nHello **Bob**")
        .with("footerText", "Sent by Acme");
    let welcome_id = enqueue_email(client.as_ref(), SEND_EMAIL_QUEUE, &welcome)
        .await
        .unwrap();
    let bounce = EmailJob::new("ghost@example.com", "bounce").text("anyone there?");
    let bounce_id = enqueue_email(client.as_ref(), SEND_EMAIL_QUEUE, &bounce)
        .await
        .unwrap();

    let outbox = Outbox::default();
    let handler = EmailHandler::new(
        &EmailDefaults::default(),
        DeliveryClient::new(outbox.clone(), SendPolicy::default()),
    );
    let worker = Worker::new(Arc::clone(&client), WorkerConfig::default())
        .register(SEND_EMAIL_QUEUE, handler);

    let processed = worker.run_once(SEND_EMAIL_QUEUE).await.unwrap();
    assert_eq!(processed, 2);

    let job = client.get_job(SEND_EMAIL_QUEUE, welcome_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    let job = client.get_job(SEND_EMAIL_QUEUE, bounce_id).await.unwrap().unwrap();
    // a bounce is retried through the queue, after a backoff
    assert_eq!(job.state, JobState::Retry);
    assert_eq!(job.retry_count, 1);
    assert!(job.start_after > chrono::Utc::now());
    assert!(job.last_error.unwrap().contains("550"));

    let sent = outbox.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    let html = sent[0].html.as_deref().unwrap();
    assert!(html.contains("<strong>Bob</strong>"));
    assert!(!html.contains("<style"));
    assert!(html.contains("Sent by Acme"));
    assert!(sent[0].text.contains("Hello"));

    utils::drop_schema(local).await.unwrap();
}

#[tokio::test]
async fn worker_loop_drains_queue_until_shutdown() {
    let local = "worker_loop_drains_queue_until_shutdown";
    let client = Arc::new(utils::client_with_queue(local, SEND_EMAIL_QUEUE).await);

    let mut ids = Vec::new();
    for n in 0..12 {
        let email = EmailJob::new(format!("user{n}@example.com"), format!("Digest #{n}"))
            .text("nothing new this week");
        ids.push(enqueue_email(client.as_ref(), SEND_EMAIL_QUEUE, &email).await.unwrap());
    }

    let outbox = Outbox::default();
    let handler = EmailHandler::new(
        &EmailDefaults::default(),
        DeliveryClient::new(outbox.clone(), SendPolicy::default()),
    );
    let config = WorkerConfig {
        concurrency: 4,
        poll_interval: Duration::from_millis(50),
        ..Default::default()
    };
    let worker = Worker::new(Arc::clone(&client), config).register(SEND_EMAIL_QUEUE, handler);
    let shutdown = worker.shutdown_handle();
    let running = tokio::spawn(worker.run());

    tokio::time::timeout(Duration::from_secs(10), async {
        while outbox.sent.lock().unwrap().len() < ids.len() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();
    shutdown.shutdown();
    running.await.unwrap();

    for id in ids {
        let job = client.get_job(SEND_EMAIL_QUEUE, id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
    }
    utils::drop_schema(local).await.unwrap();
}
