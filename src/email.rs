//! The `send-email` job kind: payload, producer side and handler.

use crate::config::EmailDefaults;
use crate::delivery::{DeliveryClient, Mailbox, Message};
use crate::job::{ActiveJob, Job, JobBuilder};
use crate::render::{Content, Renderer, TemplateContext};
use crate::store::JobStore;
use crate::worker::{Handler, HandlerError};
use crate::Error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue the application sends notifications to.
pub const SEND_EMAIL_QUEUE: &str = "send-email";

/// One address or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Recipients {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice = match self {
            Self::One(address) => std::slice::from_ref(address),
            Self::Many(addresses) => addresses.as_slice(),
        };
        slice.iter().map(String::as_str)
    }
}

impl From<&str> for Recipients {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for Recipients {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<Vec<String>> for Recipients {
    fn from(value: Vec<String>) -> Self {
        Self::Many(value)
    }
}

/// Payload of a `send-email` job.
///
/// ```
/// # use pgmailer::EmailJob;
/// let email = EmailJob::new("a@x.com", "Welcome")
///     .markdown("# Hi **{{name}}**")
///     .with("name", "Bob");
/// assert_eq!(email.subject, "Welcome");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailJob {
    pub to: Recipients,
    pub subject: String,
    /// Overrides the configured sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Full HTML page with `{{body}}` and other tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "TemplateContext::is_empty")]
    pub template_data: TemplateContext,
}

impl EmailJob {
    pub fn new<R, S>(to: R, subject: S) -> Self
    where
        R: Into<Recipients>,
        S: Into<String>,
    {
        Self {
            to: to.into(),
            subject: subject.into(),
            from: None,
            markdown: None,
            html: None,
            text: None,
            template: None,
            template_data: TemplateContext::new(),
        }
    }

    pub fn sender<S: Into<String>>(mut self, from: S) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn markdown<S: Into<String>>(mut self, markdown: S) -> Self {
        self.markdown = Some(markdown.into());
        self
    }

    pub fn html<S: Into<String>>(mut self, html: S) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn template<S: Into<String>>(mut self, template: S) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Adds a template token.
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<crate::render::TemplateValue>,
    {
        self.template_data.insert(key.into(), value.into());
        self
    }

    /// Job carrying this payload, to be adjusted further before sending.
    ///
    /// ```
    /// # use pgmailer::{EmailJob, SEND_EMAIL_QUEUE};
    /// # use std::time::Duration;
    /// let job = EmailJob::new("a@x.com", "Reminder")
    ///     .text("Your trial ends tomorrow")
    ///     .to_job(SEND_EMAIL_QUEUE)
    ///     .unwrap()
    ///     .retry_limit(5)
    ///     .delay_for(Duration::from_secs(3600))
    ///     .build();
    /// assert_eq!(job.retry_limit, Some(5));
    /// ```
    pub fn to_job(&self, queue_name: &str) -> Result<JobBuilder, Error> {
        let data = serde_json::to_value(self).map_err(|_| Error::Unprocessable {
            msg: "email payload cannot be serialized",
        })?;
        Ok(Job::builder().queue_name(queue_name).data(data))
    }

    fn content(&self) -> Content<'_> {
        Content {
            markdown: self.markdown.as_deref(),
            html: self.html.as_deref(),
            text: self.text.as_deref(),
            template: self.template.as_deref(),
            data: Some(&self.template_data),
        }
    }
}

/// Enqueues a notification with the queue's retry settings.
///
/// Errors only when the store cannot take the job. Callers serving a request
/// are expected to log such an error and carry on.
pub async fn enqueue_email<S>(store: &S, queue_name: &str, email: &EmailJob) -> Result<Uuid, Error>
where
    S: JobStore + ?Sized,
{
    let job = email.to_job(queue_name)?.build();
    let id = store.send_job(&job).await?;
    tracing::debug!(queue = %queue_name, job_id = %id, subject = %email.subject, "email enqueued");
    Ok(id)
}

/// Renders and sends `send-email` jobs.
#[derive(Debug, Clone)]
pub struct EmailHandler {
    renderer: Renderer,
    delivery: DeliveryClient,
    from: String,
}

impl EmailHandler {
    pub fn new(defaults: &EmailDefaults, delivery: DeliveryClient) -> Self {
        Self {
            renderer: Renderer::new(defaults.logo_url.clone(), defaults.footer_text.clone()),
            delivery,
            from: defaults.from.clone(),
        }
    }

    /// Use `renderer` instead of one built from the defaults.
    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    fn prepare(&self, email: &EmailJob) -> Result<Message, HandlerError> {
        let from_address = email.from.as_deref().unwrap_or(&self.from);
        let from: Mailbox = from_address
            .parse()
            .map_err(|e| HandlerError::fatal(format!("invalid from address {from_address:?}: {e}")))?;
        let to = email
            .to
            .iter()
            .map(|address| {
                address
                    .parse::<Mailbox>()
                    .map_err(|e| HandlerError::fatal(format!("invalid recipient {address:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(HandlerError::fatal("no recipients"));
        }
        let rendered = self
            .renderer
            .render(&email.content())
            .map_err(|e| HandlerError::fatal(format!("rendering failed: {e}")))?;
        Ok(Message {
            from,
            to,
            subject: email.subject.clone(),
            html: rendered.html,
            text: rendered.text,
        })
    }
}

#[async_trait]
impl Handler for EmailHandler {
    async fn handle(&self, job: &ActiveJob) -> Result<(), HandlerError> {
        let email: EmailJob = serde_json::from_value(job.data.clone())
            .map_err(|e| HandlerError::fatal(format!("invalid payload: {e}")))?;
        let message = self.prepare(&email)?;
        let receipt = self.delivery.send(&message).await.map_err(|e| {
            if e.is_retryable() {
                HandlerError::retryable(e)
            } else {
                HandlerError::fatal(e)
            }
        })?;
        tracing::info!(
            queue = %job.queue_name,
            job_id = %job.id,
            message_id = %receipt.message_id,
            recipients = receipt.accepted.len(),
            "email sent"
        );
        Ok(())
    }
}
