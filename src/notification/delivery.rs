//! Outbound email channel.
//!
//! The processor only sees [`EmailChannel`]: a send either succeeds or fails
//! with a message. Transport details stay behind [`SmtpChannel`].

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
#[cfg(test)]
use mockall::automock;
use tracing::{debug, error, info};

/// Port on which SMTP is spoken over implicit TLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// A rendered email ready to hand to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Outcome of a single send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn sent() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// A way of getting an email to a recipient. Implementations never retry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EmailChannel: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> DeliveryOutcome;

    /// Channel name for logging.
    fn name(&self) -> &'static str;
}

/// SMTP settings
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender address; defaults to the username.
    pub from: String,
    /// False only for local mail catchers.
    pub use_tls: bool,
}

impl SmtpConfig {
    pub fn implicit_tls(&self) -> bool {
        self.port == IMPLICIT_TLS_PORT
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Invalid sender address {0}")]
    InvalidSender(String),

    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

pub struct SmtpChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpChannel {
    pub fn new(config: &SmtpConfig) -> Result<Self, ChannelError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| ChannelError::InvalidSender(format!("{}: {}", config.from, e)))?;

        let mut builder = if !config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        } else if config.implicit_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        }
        .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        info!(
            "SMTP channel configured for {}:{} (tls: {}, implicit: {})",
            config.host,
            config.port,
            config.use_tls,
            config.implicit_tls()
        );

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, String> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| format!("Invalid recipient address: {}", e))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html.clone()),
                    ),
            )
            .map_err(|e| format!("Failed to build email message: {}", e))
    }
}

#[async_trait]
impl EmailChannel for SmtpChannel {
    async fn send(&self, email: &OutgoingEmail) -> DeliveryOutcome {
        debug!("Sending email to {} via SMTP", email.to);

        let message = match self.build_message(email) {
            Ok(message) => message,
            Err(e) => {
                error!("Email delivery failed: {}", e);
                return DeliveryOutcome::failed(e);
            }
        };

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email delivered to {}", email.to);
                DeliveryOutcome::sent()
            }
            Err(e) => {
                error!("Email delivery failed: {}", e);
                DeliveryOutcome::failed(e.to_string())
            }
        }
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
