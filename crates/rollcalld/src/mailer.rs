//! SMTP delivery for registration and attendance notifications.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use rollcall_core::notify::{Notification, NotifyError, Notifier};

use crate::config::Config;

pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    /// Build from config. Returns `None` when no SMTP host is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, NotifyError> {
        let Some(host) = config.smtp_host.as_deref() else {
            tracing::info!("SMTP not configured; notifications will only be logged");
            return Ok(None);
        };
        let from: Mailbox = config
            .smtp_from
            .parse()
            .map_err(|_| NotifyError::InvalidAddress(config.smtp_from.clone()))?;

        let builder = if config.smtp_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| NotifyError::Delivery(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        let builder = builder.port(config.smtp_port);
        let builder = match (config.smtp_user.as_deref(), config.smtp_password.as_deref()) {
            (Some(user), Some(password)) => {
                builder.credentials(Credentials::new(user.to_string(), password.to_string()))
            }
            _ => builder,
        };

        tracing::info!(
            host,
            port = config.smtp_port,
            starttls = config.smtp_starttls,
            "SMTP notifier initialized"
        );
        Ok(Some(Self {
            mailer: builder.build(),
            from,
        }))
    }
}

fn compose(from: &Mailbox, message: &Notification) -> Result<Message, NotifyError> {
    let to: Mailbox = message
        .to
        .parse()
        .map_err(|_| NotifyError::InvalidAddress(message.to.clone()))?;
    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(message.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(message.body.clone())
        .map_err(|e| NotifyError::Delivery(e.to_string()))
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, message: &Notification) -> Result<(), NotifyError> {
        let email = compose(&self.from, message)?;
        self.mailer
            .send(email)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        tracing::info!(to = %message.to, subject = %message.subject, "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(to: &str) -> Notification {
        Notification {
            to: to.into(),
            subject: "Registration Approved".into(),
            body: "Welcome aboard.".into(),
        }
    }

    #[test]
    fn test_compose_plain_text() {
        let from: Mailbox = "Rollcall <rollcall@school.edu>".parse().unwrap();
        let email = compose(&from, &notification("asha@school.edu")).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("To: asha@school.edu"));
        assert!(raw.contains("Subject: Registration Approved"));
        assert!(raw.contains("Welcome aboard."));
    }

    #[test]
    fn test_compose_rejects_bad_recipient() {
        let from: Mailbox = "rollcall@school.edu".parse().unwrap();
        assert!(matches!(
            compose(&from, &notification("not an address")),
            Err(NotifyError::InvalidAddress(_))
        ));
    }
}
