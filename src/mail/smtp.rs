//! SMTP sender — lettre over rustls.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::MailConfig;
use crate::error::TransportError;
use crate::mail::MailSender;
use crate::notify::OutboundNotification;

/// Outbound mail via SMTP. The transport is rebuilt per send; sends are
/// rare enough that connection reuse buys nothing.
pub struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, notification: &OutboundNotification) -> Result<Message, TransportError> {
        let from: Mailbox = format!("{} <{}>", self.config.display_name, self.config.address)
            .parse()
            .map_err(|e| TransportError::SendFailed {
                to: notification.to.join(", "),
                reason: format!("invalid from address: {e}"),
            })?;

        let mut builder = Message::builder()
            .from(from)
            .subject(&notification.subject);
        for to in &notification.to {
            builder = builder.to(to.parse().map_err(|e| TransportError::SendFailed {
                to: to.clone(),
                reason: format!("invalid recipient: {e}"),
            })?);
        }

        builder
            .body(notification.body.clone())
            .map_err(|e| TransportError::SendFailed {
                to: notification.to.join(", "),
                reason: format!("failed to build message: {e}"),
            })
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, notification: &OutboundNotification) -> Result<(), TransportError> {
        if notification.to.is_empty() {
            return Err(TransportError::SendFailed {
                to: String::new(),
                reason: "no recipients".into(),
            });
        }

        let message = self.build_message(notification)?;
        let config = self.config.clone();
        let to = notification.to.join(", ");

        let result = tokio::task::spawn_blocking(move || {
            let creds = Credentials::new(
                config.address.clone(),
                config.password.expose_secret().to_string(),
            );
            let transport = SmtpTransport::relay(&config.smtp_host)
                .map_err(|e| format!("SMTP relay error: {e}"))?
                .port(config.smtp_port)
                .credentials(creds)
                .build();
            transport
                .send(&message)
                .map(|_| ())
                .map_err(|e| format!("SMTP send failed: {e}"))
        })
        .await
        .map_err(|e| TransportError::SendFailed {
            to: to.clone(),
            reason: format!("send task panicked: {e}"),
        })?;

        result.map_err(|reason| TransportError::SendFailed {
            to: to.clone(),
            reason,
        })?;

        tracing::info!(to = %to, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config() -> MailConfig {
        MailConfig {
            imap_host: "imap.test.example".into(),
            imap_port: 993,
            smtp_host: "smtp.test.example".into(),
            smtp_port: 465,
            address: "assistant@test.example".into(),
            password: SecretString::from("secret"),
            display_name: "Meeting Assist".into(),
        }
    }

    #[test]
    fn build_message_with_display_name() {
        let mailer = SmtpMailer::new(config());
        let msg = mailer
            .build_message(&OutboundNotification {
                to: vec!["alice@example.com".into()],
                subject: "Confirmed".into(),
                body: "See you there".into(),
            })
            .unwrap();
        let formatted = String::from_utf8(msg.formatted()).unwrap();
        assert!(formatted.contains("Meeting Assist"));
        assert!(formatted.contains("alice@example.com"));
    }

    #[test]
    fn build_message_rejects_bad_recipient() {
        let mailer = SmtpMailer::new(config());
        let result = mailer.build_message(&OutboundNotification {
            to: vec!["not an address".into()],
            subject: "x".into(),
            body: "y".into(),
        });
        assert!(result.is_err());
    }
}
