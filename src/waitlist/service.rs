//! Signup and confirmation flows.
//!
//! `SignupCoordinator::submit` runs the gates in order: rate limit, field
//! types, bot heuristics, email validation, disposable domain, registration,
//! token issue and confirmation email. The first gate that fails ends the flow, so nothing
//! rejected by a gate ever reaches the registrar.
//!
//! `ConfirmationCoordinator::confirm` verifies the token, promotes the record
//! and sends the welcome email only for the call that performed the
//! transition. The welcome email goes out on a background task so a slow relay
//! never holds the redirect; a failure is logged and the confirmation stands.

use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn, Instrument, Span};

use super::clock::Clock;
use super::error::{ConfirmationError, FieldError, SignupError};
use super::models::{ConfirmOutcome, CreateOutcome};
use super::rate_limit::{Admission, RateLimiter};
use super::registrar::{normalize_email, valid_email, Registrar};
use super::spam::{SpamFilter, SpamSignal, SpamVerdict, Submission};
use super::token::{TokenCodec, TokenVerdict};
use crate::api::email::{EmailMessage, EmailSender, EmailTemplate};

const DEFAULT_PUBLIC_URL: &str = "http://localhost:8080";
const DEFAULT_STATUS_PAGE: &str = "/waitlist";
const CONFIRM_PATH: &str = "/waitlist/confirm";

/// Where links in emails point and where confirmation redirects land.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateConfig {
    public_url: String,
    status_page: String,
}

impl GateConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            status_page: DEFAULT_STATUS_PAGE.to_string(),
        }
    }

    #[must_use]
    pub fn with_public_url(mut self, public_url: String) -> Self {
        self.public_url = public_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_status_page(mut self, status_page: String) -> Self {
        self.status_page = status_page;
        self
    }

    #[must_use]
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    #[must_use]
    pub fn status_page(&self) -> &str {
        &self.status_page
    }

    #[must_use]
    pub fn confirm_url(&self, token: &str) -> String {
        format!("{}{CONFIRM_PATH}?token={token}", self.public_url)
    }

    /// Status page URL with one extra query parameter appended.
    #[must_use]
    pub fn status_location(&self, key: &str, value: &str) -> String {
        let separator = if self.status_page.contains('?') { '&' } else { '?' };
        format!("{}{separator}{key}={value}", self.status_page)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw signup form fields as submitted.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignupForm<'a> {
    pub email: Option<&'a str>,
    pub honeypot: Option<&'a str>,
    /// Unix milliseconds at which the form was rendered.
    pub rendered_at_millis: Option<i64>,
    /// Fields present in the body with the wrong JSON type.
    pub type_errors: &'a [FieldError],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignupOutcome {
    /// New pending record, confirmation email sent.
    Accepted,
    /// Record was already pending; a fresh confirmation email went out.
    Resent,
    /// Bot signal tripped. Answered like `Accepted`, nothing stored or sent.
    AcceptedSilently(SpamSignal),
}

pub struct SignupCoordinator {
    limiter: Arc<RateLimiter>,
    filter: Arc<SpamFilter>,
    registrar: Arc<Registrar>,
    codec: Arc<TokenCodec>,
    sender: Arc<dyn EmailSender>,
    clock: Arc<dyn Clock>,
    config: GateConfig,
}

impl SignupCoordinator {
    pub fn new(
        limiter: Arc<RateLimiter>,
        filter: Arc<SpamFilter>,
        registrar: Arc<Registrar>,
        codec: Arc<TokenCodec>,
        sender: Arc<dyn EmailSender>,
        clock: Arc<dyn Clock>,
        config: GateConfig,
    ) -> Self {
        Self {
            limiter,
            filter,
            registrar,
            codec,
            sender,
            clock,
            config,
        }
    }

    /// Run one signup submission from `client_key` through every gate.
    ///
    /// # Errors
    /// Returns the first gate that rejected the submission, or the storage or
    /// notification failure that stopped it.
    pub async fn submit(
        &self,
        client_key: &str,
        form: &SignupForm<'_>,
    ) -> Result<SignupOutcome, SignupError> {
        if let Admission::Denied {
            retry_after_seconds,
        } = self.limiter.admit(client_key).await
        {
            info!(client_key, retry_after_seconds, "signup rate limited");
            return Err(SignupError::RateLimited {
                retry_after_seconds,
            });
        }

        let email = normalize_email(form.email.unwrap_or_default());

        if !form.type_errors.is_empty() {
            let mut details = form.type_errors.to_vec();
            if !details.iter().any(|detail| detail.field == "email") {
                if let Some(message) = email_error(form.email, &email) {
                    details.insert(
                        0,
                        FieldError {
                            field: "email",
                            message,
                        },
                    );
                }
            }
            return Err(SignupError::Validation(details));
        }

        let now = self.clock.now();
        let verdict = self.filter.evaluate(
            &Submission {
                email: &email,
                honeypot: form.honeypot,
                rendered_at_millis: form.rendered_at_millis,
            },
            now,
        );

        let blocked_domain = match verdict {
            SpamVerdict::Suspicious(signal) if signal.is_silent() => {
                info!(client_key, signal = ?signal, "spam submission dropped");
                return Ok(SignupOutcome::AcceptedSilently(signal));
            }
            SpamVerdict::Suspicious(SpamSignal::DisposableDomain { domain }) => Some(domain),
            SpamVerdict::Suspicious(_) | SpamVerdict::Clean => None,
        };

        validate_email(form.email, &email)?;

        if let Some(domain) = blocked_domain {
            info!(client_key, domain = %domain, "disposable email domain rejected");
            return Err(SignupError::BlockedDomain(domain));
        }

        let outcome = match self
            .registrar
            .create(&email)
            .await
            .map_err(SignupError::Registration)?
        {
            CreateOutcome::Created => SignupOutcome::Accepted,
            CreateOutcome::AlreadyPending => SignupOutcome::Resent,
            CreateOutcome::AlreadyConfirmed => return Err(SignupError::DuplicateConfirmed),
        };

        let token = self
            .codec
            .issue(&email, now)
            .map_err(SignupError::Notification)?;

        let message = EmailMessage {
            to_email: email.clone(),
            template: EmailTemplate::Confirmation,
            payload: json!({
                "email": email,
                "confirm_url": self.config.confirm_url(&token),
                "expires_in_seconds": self.codec.config().ttl().as_secs(),
            }),
        };
        self.sender
            .send(&message)
            .await
            .map_err(SignupError::Notification)?;

        Ok(outcome)
    }
}

fn email_error(raw: Option<&str>, normalized: &str) -> Option<&'static str> {
    match raw {
        None => Some("Required"),
        Some(_) if !valid_email(normalized) => Some("Invalid email format"),
        Some(_) => None,
    }
}

fn validate_email(raw: Option<&str>, normalized: &str) -> Result<(), SignupError> {
    match email_error(raw, normalized) {
        Some(message) => Err(SignupError::Validation(vec![FieldError {
            field: "email",
            message,
        }])),
        None => Ok(()),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub email: String,
    pub newly_confirmed: bool,
}

pub struct ConfirmationCoordinator {
    codec: Arc<TokenCodec>,
    registrar: Arc<Registrar>,
    sender: Arc<dyn EmailSender>,
    clock: Arc<dyn Clock>,
}

impl ConfirmationCoordinator {
    pub fn new(
        codec: Arc<TokenCodec>,
        registrar: Arc<Registrar>,
        sender: Arc<dyn EmailSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codec,
            registrar,
            sender,
            clock,
        }
    }

    /// Confirm the email carried by `token`. Confirming twice succeeds.
    ///
    /// # Errors
    /// Returns why the token was refused or why the record could not be confirmed.
    pub async fn confirm(&self, token: Option<&str>) -> Result<Confirmation, ConfirmationError> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ConfirmationError::TokenMalformed)?;

        let email = match self.codec.verify(token, self.clock.now()) {
            TokenVerdict::Valid { email } => email,
            TokenVerdict::Expired { email } => {
                return Err(ConfirmationError::TokenExpired { email });
            }
            TokenVerdict::Malformed => return Err(ConfirmationError::TokenMalformed),
        };

        let newly_confirmed = match self
            .registrar
            .confirm(&email)
            .await
            .map_err(ConfirmationError::Registration)?
        {
            ConfirmOutcome::Confirmed { newly_confirmed } => newly_confirmed,
            ConfirmOutcome::NotFound => return Err(ConfirmationError::NotFound { email }),
        };

        if newly_confirmed {
            info!(email = %email, "waitlist entry confirmed");
            let message = EmailMessage {
                to_email: email.clone(),
                template: EmailTemplate::Welcome,
                payload: json!({ "email": email }),
            };
            let sender = Arc::clone(&self.sender);
            tokio::spawn(
                async move {
                    if let Err(err) = sender.send(&message).await {
                        warn!(email = %message.to_email, "Failed to send welcome email: {err}");
                    }
                }
                .instrument(Span::current()),
            );
        }

        Ok(Confirmation {
            email,
            newly_confirmed,
        })
    }
}
