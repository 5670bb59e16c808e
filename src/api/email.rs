//! Notification delivery for the waitlist flow.
//!
//! The signup flow hands a `confirmation` message to an [`EmailSender`]; the
//! confirmation flow hands over a `welcome` message once per email. The sender
//! decides how to deliver and returns `Ok`/`Err`.
//!
//! - `LogEmailSender` logs the message and returns `Ok(())`. It is the default
//!   when no relay is configured and is handy in local dev.
//! - `WebhookEmailSender` POSTs the message as JSON to an HTTP relay (an SMTP
//!   bridge, a transactional mail API gateway, ...). Any non-2xx answer is an
//!   error so the caller can report the failure.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, info_span, Instrument};
use url::Url;

use crate::APP_USER_AGENT;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailTemplate {
    Confirmation,
    Welcome,
}

impl EmailTemplate {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmation => "confirmation",
            Self::Welcome => "welcome",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: EmailTemplate,
    pub payload: Value,
}

/// Email delivery abstraction used by the signup and confirmation flows.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to report the delivery as failed.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = message.template.as_str(),
            payload = %message.payload,
            "email send stub"
        );
        Ok(())
    }
}

/// Relays messages to an HTTP endpoint as `{to_email, template, payload}`.
#[derive(Clone, Debug)]
pub struct WebhookEmailSender {
    client: Client,
    url: Url,
}

impl WebhookEmailSender {
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid notify URL: {url}"))?;
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build notify HTTP client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl EmailSender for WebhookEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let span = info_span!(
            "email.webhook",
            template = message.template.as_str(),
            http.url = %self.url
        );
        let response = self
            .client
            .post(self.url.clone())
            .json(message)
            .send()
            .instrument(span)
            .await
            .context("Failed to reach notify endpoint")?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(anyhow!("notify endpoint answered {status}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_serializes_with_lowercase_template() -> Result<()> {
        let message = EmailMessage {
            to_email: "a@b.com".to_string(),
            template: EmailTemplate::Confirmation,
            payload: json!({ "confirm_url": "http://localhost/waitlist/confirm?token=t" }),
        };
        let value = serde_json::to_value(&message)?;
        assert_eq!(value["template"], "confirmation");
        assert_eq!(value["to_email"], "a@b.com");
        assert_eq!(
            value["payload"]["confirm_url"],
            "http://localhost/waitlist/confirm?token=t"
        );
        Ok(())
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() -> Result<()> {
        let message = EmailMessage {
            to_email: "a@b.com".to_string(),
            template: EmailTemplate::Welcome,
            payload: json!({ "email": "a@b.com" }),
        };
        LogEmailSender.send(&message).await
    }

    #[test]
    fn webhook_rejects_invalid_url() {
        assert!(WebhookEmailSender::new("not a url").is_err());
        assert!(WebhookEmailSender::new("https://relay.example.com/send").is_ok());
    }
}
