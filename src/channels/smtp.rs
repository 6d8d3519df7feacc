//! A channel that delivers messages by email through an SMTP relay.

use crate::channels::render::RenderedMessage;
use crate::config::SmtpConfig;
use crate::core::{Channel, ChannelKind, DeliveryError, FailureClass, Message, TransportError};
use anyhow::Context;
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Sender used when no `from` address is configured.
pub const FALLBACK_SENDER: &str = "notifr@localhost";

/// Hands a finished email to the wire.
///
/// Implementations classify every failure as transient or permanent where it
/// happens, so the retry loop never has to inspect transport internals.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: lettre::Message) -> Result<(), TransportError>;
}

/// Classifies an I/O failure kind.
pub fn classify_io(kind: io::ErrorKind) -> FailureClass {
    match kind {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::TimedOut => FailureClass::Transient,
        _ => FailureClass::Permanent,
    }
}

fn classify_smtp(err: &lettre::transport::smtp::Error) -> FailureClass {
    if err.is_timeout() {
        return FailureClass::Transient;
    }
    let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = cause {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return classify_io(io_err.kind());
        }
        cause = e.source();
    }
    FailureClass::Permanent
}

/// The production transport: lettre's async SMTP client with opportunistic STARTTLS.
pub struct LettreTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
}

impl LettreTransport {
    pub fn new(host: &str, port: u16) -> anyhow::Result<Self> {
        let tls = TlsParameters::new(host.to_string())
            .with_context(|| format!("invalid TLS parameters for SMTP host {host}"))?;
        let inner = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .tls(Tls::Opportunistic(tls))
            .timeout(Some(Duration::from_secs(60)))
            .build();
        Ok(Self { inner })
    }
}

#[async_trait]
impl MailTransport for LettreTransport {
    async fn send(&self, email: lettre::Message) -> Result<(), TransportError> {
        match self.inner.send(email).await {
            Ok(response) => {
                debug!(code = %response.code(), "SMTP relay accepted message");
                Ok(())
            }
            Err(err) => Err(TransportError {
                class: classify_smtp(&err),
                source: err.into(),
            }),
        }
    }
}

/// Delivers messages as multipart (plain + HTML) email.
///
/// The retry schedule bounds the number of attempts: one attempt per entry,
/// the first immediate and each later one after the wait of the preceding
/// entry. Only transient failures are retried. An empty schedule means a
/// single attempt.
pub struct SmtpChannel {
    from: Mailbox,
    retries: Vec<Duration>,
    transport: Arc<dyn MailTransport>,
}

impl SmtpChannel {
    /// Builds a channel that talks to the relay described by `config`.
    pub fn from_config(config: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = LettreTransport::new(&config.host, config.port)?;
        Self::with_transport(
            config.from.as_deref(),
            config.retries.durations().to_vec(),
            Arc::new(transport),
        )
    }

    /// Builds a channel over an arbitrary transport.
    pub fn with_transport(
        from: Option<&str>,
        retries: Vec<Duration>,
        transport: Arc<dyn MailTransport>,
    ) -> anyhow::Result<Self> {
        let from = from.unwrap_or(FALLBACK_SENDER);
        let from: Mailbox = from
            .parse()
            .with_context(|| format!("invalid sender address {from:?}"))?;
        Ok(Self {
            from,
            retries,
            transport,
        })
    }

    fn build_email(
        &self,
        recipients: &[String],
        rendered: RenderedMessage,
    ) -> Result<lettre::Message, DeliveryError> {
        let mut builder = lettre::Message::builder()
            .from(self.from.clone())
            .subject(rendered.subject);
        for recipient in recipients {
            let mailbox: Mailbox = recipient
                .parse()
                .map_err(|e| DeliveryError::Build(format!("recipient {recipient:?}: {e}")))?;
            builder = builder.to(mailbox);
        }
        builder
            .multipart(MultiPart::alternative_plain_html(rendered.plain, rendered.html))
            .map_err(|e| DeliveryError::Build(e.to_string()))
    }

    async fn deliver(&self, email: lettre::Message) -> Result<(), DeliveryError> {
        let max_attempts = self.retries.len().max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            metrics::counter!("notifr_smtp_attempts_total").increment(1);
            match self.transport.send(email.clone()).await {
                Ok(()) => {
                    info!(attempt, "Email sent");
                    return Ok(());
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let wait = self.retries[attempt - 1];
                    warn!(attempt, error = %err, ?wait, "Transient SMTP failure, retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(err) => {
                    return Err(DeliveryError::Transport {
                        attempts: attempt,
                        source: err,
                    })
                }
            }
        }
    }
}

#[async_trait]
impl Channel for SmtpChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::smtp()
    }

    #[instrument(skip_all, fields(recipients = recipients.len()))]
    async fn send(&self, recipients: &[String], message: &Message) -> Result<(), DeliveryError> {
        let rendered = RenderedMessage::from_message(message);
        let email = self.build_email(recipients, rendered)?;
        self.deliver(email).await
    }
}
