//! Cheap heuristics for automated signup submissions.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

const DEFAULT_MIN_FILL_MILLIS: i64 = 3_000;
const DEFAULT_BLOCKED_DOMAINS: [&str; 3] = ["tempmail.org", "10minutemail.com", "guerrillamail.com"];

#[derive(Clone, Debug)]
pub struct SpamConfig {
    min_fill_millis: i64,
    blocked_domains: HashSet<String>,
}

impl SpamConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_fill_millis: DEFAULT_MIN_FILL_MILLIS,
            blocked_domains: DEFAULT_BLOCKED_DOMAINS
                .iter()
                .map(|domain| (*domain).to_string())
                .collect(),
        }
    }

    #[must_use]
    pub fn with_min_fill_millis(mut self, millis: i64) -> Self {
        self.min_fill_millis = millis.max(0);
        self
    }

    /// Replace the disposable-domain list. Entries are trimmed and lowercased;
    /// blanks are ignored.
    #[must_use]
    pub fn with_blocked_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blocked_domains = domains
            .into_iter()
            .map(|domain| domain.as_ref().trim().to_lowercase())
            .filter(|domain| !domain.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn min_fill_millis(&self) -> i64 {
        self.min_fill_millis
    }

    #[must_use]
    pub fn is_blocked_domain(&self, domain: &str) -> bool {
        self.blocked_domains.contains(&domain.to_lowercase())
    }
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The fields of a form submission the filter looks at.
#[derive(Clone, Copy, Debug)]
pub struct Submission<'a> {
    pub email: &'a str,
    pub honeypot: Option<&'a str>,
    /// Unix milliseconds at which the form was rendered.
    pub rendered_at_millis: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpamSignal {
    Honeypot,
    TooFast { elapsed_millis: i64 },
    DisposableDomain { domain: String },
}

impl SpamSignal {
    /// Bot signals are answered as if the signup succeeded; the domain check is
    /// a regular validation error.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Honeypot | Self::TooFast { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpamVerdict {
    Clean,
    Suspicious(SpamSignal),
}

#[derive(Clone, Debug, Default)]
pub struct SpamFilter {
    config: SpamConfig,
}

impl SpamFilter {
    #[must_use]
    pub fn new(config: SpamConfig) -> Self {
        Self { config }
    }

    /// Run honeypot, timing and domain checks in that order; the first match wins.
    #[must_use]
    pub fn evaluate(&self, submission: &Submission<'_>, now: DateTime<Utc>) -> SpamVerdict {
        if submission
            .honeypot
            .is_some_and(|value| !value.trim().is_empty())
        {
            return SpamVerdict::Suspicious(SpamSignal::Honeypot);
        }

        if let Some(rendered_at) = submission.rendered_at_millis {
            let elapsed_millis = now.timestamp_millis().saturating_sub(rendered_at);
            if elapsed_millis < self.config.min_fill_millis() {
                return SpamVerdict::Suspicious(SpamSignal::TooFast { elapsed_millis });
            }
        }

        if let Some(domain) = email_domain(submission.email) {
            if self.config.is_blocked_domain(domain) {
                return SpamVerdict::Suspicious(SpamSignal::DisposableDomain {
                    domain: domain.to_lowercase(),
                });
            }
        }

        SpamVerdict::Clean
    }
}

fn email_domain(email: &str) -> Option<&str> {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim())
        .filter(|domain| !domain.is_empty())
}
