use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};
use serde::Deserialize;

use super::{Mailer, Notification};
use crate::error::MailError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmtpTls {
    /// Implicit TLS (SMTPS, usually port 465).
    #[default]
    Wrapper,
    Starttls,
    /// Plaintext; local relays and test servers only.
    None,
}

pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: Option<u16>,
        tls: SmtpTls,
        credentials: Option<(String, String)>,
        from: &str,
        timeout: Duration,
    ) -> Result<Self, MailError> {
        let transport = |e: lettre::transport::smtp::Error| MailError::Transport(e.to_string());
        let mut builder = match tls {
            SmtpTls::Wrapper => AsyncSmtpTransport::<Tokio1Executor>::relay(host).map_err(transport)?,
            SmtpTls::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host).map_err(transport)?
            }
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        };
        if let Some(port) = port {
            builder = builder.port(port);
        }
        if let Some((user, pass)) = credentials {
            builder = builder.credentials(Credentials::new(user, pass));
        }
        let mailer = builder.timeout(Some(timeout)).build();

        Ok(Self {
            mailer,
            from: parse_mailbox(from)?,
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
        address: address.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, notification: &Notification, recipients: &[String]) -> Result<(), MailError> {
        if recipients.is_empty() {
            return Err(MailError::Build("no recipients configured".into()));
        }

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(notification.subject.clone());
        for to in recipients {
            builder = builder.to(parse_mailbox(to)?);
        }
        let msg = builder
            .multipart(MultiPart::alternative_plain_html(
                notification.text_body.clone(),
                notification.html_body.clone(),
            ))
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.mailer
            .send(msg)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(())
    }
}
