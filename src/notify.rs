//! Confirmation notifications sent after a request is filed.
//!
//! Delivery is best-effort: the submission pipeline logs failures and moves
//! on, so nothing here can undo a persisted request.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::error::NotificationError;

// ── Configuration ───────────────────────────────────────────────────

/// SMTP settings, read from `RECORDS_SMTP_*` variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl EmailConfig {
    /// Returns `None` if `RECORDS_SMTP_HOST` is not set (email disabled).
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let smtp_host = lookup("RECORDS_SMTP_HOST").filter(|h| !h.trim().is_empty())?;

        let smtp_port: u16 = lookup("RECORDS_SMTP_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = lookup("RECORDS_SMTP_USERNAME").unwrap_or_default();
        let password = lookup("RECORDS_SMTP_PASSWORD").unwrap_or_default();
        let from_address = lookup("RECORDS_EMAIL_FROM").unwrap_or_else(|| username.clone());

        Some(Self {
            smtp_host,
            smtp_port,
            username,
            password: SecretString::from(password),
            from_address,
        })
    }
}

// ── Notifier ────────────────────────────────────────────────────────

/// What the requester is told once their request is on file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub recipient: String,
    pub name: String,
    pub agency_name: String,
    pub record_type: String,
    pub request_id: Uuid,
}

impl Confirmation {
    pub fn subject(&self) -> String {
        format!("Your records request to {} was submitted", self.agency_name)
    }

    pub fn body(&self) -> String {
        format!(
            "Hi {name},\n\n\
             Your public records request has been submitted.\n\n\
             Agency: {agency}\n\
             Records: {records}\n\
             Reference: {id}\n\n\
             Agencies usually acknowledge requests within a few business days. \
             Keep this reference number in case you need to follow up.\n",
            name = self.name,
            agency = self.agency_name,
            records = self.record_type,
            id = self.request_id,
        )
    }
}

#[async_trait]
pub trait ConfirmationNotifier: Send + Sync {
    async fn send_confirmation(&self, confirmation: &Confirmation)
        -> Result<(), NotificationError>;
}

/// Sends confirmations over SMTP.
pub struct SmtpNotifier {
    config: EmailConfig,
}

impl SmtpNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, confirmation: &Confirmation) -> Result<Message, NotificationError> {
        let from: Mailbox =
            self.config
                .from_address
                .parse()
                .map_err(|e: lettre::address::AddressError| NotificationError::InvalidAddress {
                    address: self.config.from_address.clone(),
                    reason: e.to_string(),
                })?;
        let to: Mailbox =
            confirmation
                .recipient
                .parse()
                .map_err(|e: lettre::address::AddressError| NotificationError::InvalidAddress {
                    address: confirmation.recipient.clone(),
                    reason: e.to_string(),
                })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(confirmation.subject())
            .body(confirmation.body())
            .map_err(|e| NotificationError::Build(e.to_string()))
    }
}

/// Blocking SMTP send. Run on the blocking pool.
fn send_blocking(config: &EmailConfig, email: &Message) -> Result<(), NotificationError> {
    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );

    let transport = SmtpTransport::relay(&config.smtp_host)
        .map_err(|e| NotificationError::SendFailed(format!("SMTP relay error: {e}")))?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    transport
        .send(email)
        .map_err(|e| NotificationError::SendFailed(format!("SMTP send failed: {e}")))?;
    Ok(())
}

#[async_trait]
impl ConfirmationNotifier for SmtpNotifier {
    async fn send_confirmation(
        &self,
        confirmation: &Confirmation,
    ) -> Result<(), NotificationError> {
        let email = self.build_message(confirmation)?;
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || send_blocking(&config, &email))
            .await
            .map_err(|e| NotificationError::SendFailed(format!("send task failed: {e}")))??;

        tracing::info!(
            request_id = %confirmation.request_id,
            "Confirmation email sent to {}",
            confirmation.recipient
        );
        Ok(())
    }
}

/// Logs confirmations instead of sending them. Used when SMTP is not
/// configured.
pub struct LogNotifier;

#[async_trait]
impl ConfirmationNotifier for LogNotifier {
    async fn send_confirmation(
        &self,
        confirmation: &Confirmation,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            request_id = %confirmation.request_id,
            recipient = %confirmation.recipient,
            agency = %confirmation.agency_name,
            "Confirmation (email disabled): {}",
            confirmation.subject()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn confirmation(recipient: &str) -> Confirmation {
        Confirmation {
            recipient: recipient.into(),
            name: "Jane".into(),
            agency_name: "Springfield PD".into(),
            record_type: "Incident reports".into(),
            request_id: Uuid::nil(),
        }
    }

    fn config() -> EmailConfig {
        EmailConfig::from_lookup(|k| {
            HashMap::from([
                ("RECORDS_SMTP_HOST", "smtp.example.com"),
                ("RECORDS_SMTP_USERNAME", "noreply@example.com"),
            ])
            .get(k)
            .map(|v| v.to_string())
        })
        .unwrap()
    }

    #[test]
    fn disabled_without_host() {
        assert!(EmailConfig::from_lookup(|_| None).is_none());
        assert!(EmailConfig::from_lookup(|_| Some(String::new())).is_none());
    }

    #[test]
    fn config_defaults() {
        let config = config();
        assert_eq!(config.smtp_port, 587);
        assert_eq!(config.from_address, "noreply@example.com");
    }

    #[test]
    fn body_mentions_agency_and_reference() {
        let c = confirmation("jane@example.com");
        assert!(c.subject().contains("Springfield PD"));
        let body = c.body();
        assert!(body.starts_with("Hi Jane,"));
        assert!(body.contains("Incident reports"));
        assert!(body.contains(&Uuid::nil().to_string()));
    }

    #[test]
    fn invalid_recipient_is_rejected() {
        let notifier = SmtpNotifier::new(config());
        let err = notifier
            .build_message(&confirmation("not an address"))
            .unwrap_err();
        assert!(matches!(err, NotificationError::InvalidAddress { .. }));
    }

    #[test]
    fn builds_message_for_valid_recipient() {
        let notifier = SmtpNotifier::new(config());
        assert!(notifier.build_message(&confirmation("jane@example.com")).is_ok());
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        LogNotifier
            .send_confirmation(&confirmation("jane@example.com"))
            .await
            .unwrap();
    }
}
