//! SMTP delivery through lettre.

use super::{DeliveryError, EmailMessage, Mailer};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::{ExposeSecret, SecretString};

#[derive(Clone, Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from: String,
    pub tls: bool,
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build the transport. No connection is made until the first delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender address or TLS settings are invalid.
    pub fn new(settings: &SmtpSettings) -> Result<Self, DeliveryError> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|err| DeliveryError::Config(format!("invalid from address: {err}")))?;

        let mut builder = if settings.tls {
            let tls = TlsParameters::new(settings.host.clone())
                .map_err(|err| DeliveryError::Config(format!("TLS configuration error: {err}")))?;
            // 465 is implicit TLS; everything else negotiates STARTTLS.
            if settings.port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                    .map_err(|err| DeliveryError::Config(format!("SMTP relay error: {err}")))?
                    .port(settings.port)
                    .tls(Tls::Wrapper(tls))
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                    .map_err(|err| DeliveryError::Config(format!("SMTP relay error: {err}")))?
                    .port(settings.port)
                    .tls(Tls::Required(tls))
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
                .port(settings.port)
        };

        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(
                user.clone(),
                pass.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|err| DeliveryError::Address(format!("{}: {err}", message.to)))?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|err| DeliveryError::Transport(format!("failed to build email: {err}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        Ok(())
    }
}
