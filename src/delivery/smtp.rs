use super::{Message, Receipt, Transport, TransportError};
use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::PoolConfig;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use uuid::Uuid;

type Inner = AsyncSmtpTransport<Tokio1Executor>;

const POOL_SIZE: u32 = 10;

enum Connection {
    Pooled(Inner),
    /// A fresh connection for every message.
    PerMessage,
}

/// SMTP transport.
///
/// With `secure` set the connection starts with TLS, otherwise STARTTLS is used
/// whenever the server offers it.
pub struct SmtpTransport {
    config: SmtpConfig,
    connection: Connection,
}

impl std::fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("secure", &self.config.secure)
            .field("pool", &self.config.pool)
            .finish_non_exhaustive()
    }
}

fn build(config: &SmtpConfig, pool_size: u32) -> Result<Inner, TransportError> {
    let tls_parameters = TlsParameters::new(config.host.clone())
        .map_err(|e| TransportError::permanent(format!("tls configuration: {e}")))?;
    let tls = if config.secure {
        Tls::Wrapper(tls_parameters)
    } else {
        Tls::Opportunistic(tls_parameters)
    };

    // lettre has one timeout for the whole exchange
    let timeout = config.connection_timeout.max(config.greeting_timeout);

    let mut builder = Inner::builder_dangerous(&config.host)
        .port(config.port)
        .tls(tls)
        .timeout(Some(timeout))
        .pool_config(PoolConfig::new().max_size(pool_size));
    if let Some((user, pass)) = &config.credentials {
        builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
    }
    Ok(builder.build())
}

impl SmtpTransport {
    pub fn new(config: SmtpConfig) -> Result<Self, TransportError> {
        let connection = if config.pool {
            Connection::Pooled(build(&config, POOL_SIZE)?)
        } else {
            // fail early on bad TLS parameters
            build(&config, 1)?;
            Connection::PerMessage
        };
        Ok(Self { config, connection })
    }

    fn build_message(&self, message: &Message) -> Result<(String, lettre::Message), TransportError> {
        let domain = message.from.email.domain();
        let message_id = format!("<{}@{}>", Uuid::new_v4(), domain);

        let mut builder = lettre::Message::builder()
            .from(message.from.clone())
            .subject(message.subject.clone())
            .message_id(Some(message_id.clone()));
        for to in &message.to {
            builder = builder.to(to.clone());
        }

        let built = match &message.html {
            Some(html) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.clone()),
                    ),
            ),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(message.text.clone()),
        }
        .map_err(|e| TransportError::permanent(format!("malformed message: {e}")))?;

        Ok((message_id, built))
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, message: &Message) -> Result<Receipt, TransportError> {
        let (message_id, email) = self.build_message(message)?;
        let response = match &self.connection {
            Connection::Pooled(inner) => inner.send(email).await,
            Connection::PerMessage => build(&self.config, 1)?.send(email).await,
        }
        // 5xx replies are retried too
        .map_err(TransportError::transient)?;

        let reply = response.message().collect::<Vec<_>>().join(" ");
        Ok(Receipt {
            message_id,
            accepted: message.to.iter().map(|m| m.email.to_string()).collect(),
            response: format!("{} {}", response.code(), reply),
        })
    }
}
