//! Registration records and their `Pending -> Confirmed` transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use regex::Regex;
use std::sync::Arc;

use super::clock::Clock;
use super::error::StoreError;
use super::models::{ConfirmOutcome, CreateOutcome, RegistrationRecord, RegistrationStatus};

const MAX_EMAIL_LENGTH: usize = 254;

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    email_normalized.len() <= MAX_EMAIL_LENGTH
        && Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
            .is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Backend contract for registration records keyed by normalized email.
///
/// `create_pending` and `confirm` must be atomic per email: two concurrent
/// `confirm` calls for one pending record report `newly_confirmed: true`
/// exactly once.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn create_pending(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome, StoreError>;

    async fn find(&self, email: &str) -> Result<Option<RegistrationRecord>, StoreError>;

    async fn confirm(&self, email: &str, now: DateTime<Utc>)
        -> Result<ConfirmOutcome, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Single-instance store. Records live as long as the process.
#[derive(Debug, Default)]
pub struct MemoryRegistrationStore {
    records: DashMap<String, RegistrationRecord>,
}

impl MemoryRegistrationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn create_pending(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome, StoreError> {
        match self.records.entry(email.to_string()) {
            Entry::Occupied(entry) => Ok(match entry.get().status {
                RegistrationStatus::Pending => CreateOutcome::AlreadyPending,
                RegistrationStatus::Confirmed => CreateOutcome::AlreadyConfirmed,
            }),
            Entry::Vacant(entry) => {
                entry.insert(RegistrationRecord::pending(email.to_string(), now));
                Ok(CreateOutcome::Created)
            }
        }
    }

    async fn find(&self, email: &str) -> Result<Option<RegistrationRecord>, StoreError> {
        Ok(self.records.get(email).map(|record| record.clone()))
    }

    async fn confirm(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, StoreError> {
        let Some(mut record) = self.records.get_mut(email) else {
            return Ok(ConfirmOutcome::NotFound);
        };

        if record.status == RegistrationStatus::Confirmed {
            return Ok(ConfirmOutcome::Confirmed {
                newly_confirmed: false,
            });
        }

        record.status = RegistrationStatus::Confirmed;
        record.confirmed_at = Some(now);
        Ok(ConfirmOutcome::Confirmed {
            newly_confirmed: true,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Single source of truth for "is this email pending or confirmed".
pub struct Registrar {
    store: Arc<dyn RegistrationStore>,
    clock: Arc<dyn Clock>,
}

impl Registrar {
    pub fn new(store: Arc<dyn RegistrationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a pending record unless one already exists for the email.
    ///
    /// # Errors
    /// Returns `StoreError` if the backend fails.
    pub async fn create(&self, email: &str) -> Result<CreateOutcome, StoreError> {
        let email = normalize_email(email);
        self.store.create_pending(&email, self.clock.now()).await
    }

    /// Promote a pending record to confirmed. Confirming twice is not an error
    /// and leaves `confirmed_at` untouched.
    ///
    /// # Errors
    /// Returns `StoreError` if the backend fails.
    pub async fn confirm(&self, email: &str) -> Result<ConfirmOutcome, StoreError> {
        let email = normalize_email(email);
        self.store.confirm(&email, self.clock.now()).await
    }

    /// # Errors
    /// Returns `StoreError` if the backend fails.
    pub async fn find(&self, email: &str) -> Result<Option<RegistrationRecord>, StoreError> {
        let email = normalize_email(email);
        self.store.find(&email).await
    }

    /// # Errors
    /// Returns `StoreError` if the backend cannot be reached.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}
