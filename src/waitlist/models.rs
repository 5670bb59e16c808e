use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, FromRow, Row};

/// Lifecycle of a waitlist entry. Moves `Pending -> Confirmed` and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
}

impl RegistrationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
        }
    }

    /// Parse the persisted `waitlist_entries.status` value.
    pub(crate) fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid waitlist_entries.status value: {value}"),
            )))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub email: String,
    pub status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl RegistrationRecord {
    #[must_use]
    pub fn pending(email: String, created_at: DateTime<Utc>) -> Self {
        Self {
            email,
            status: RegistrationStatus::Pending,
            created_at,
            confirmed_at: None,
        }
    }

    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.status == RegistrationStatus::Confirmed
    }
}

impl<'r> FromRow<'r, PgRow> for RegistrationRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            email: row.try_get("email")?,
            status: RegistrationStatus::from_db(&status)?,
            created_at: row.try_get("created_at")?,
            confirmed_at: row.try_get("confirmed_at")?,
        })
    }
}

/// Outcome of `Registrar::create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyPending,
    AlreadyConfirmed,
}

/// Outcome of `Registrar::confirm`.
///
/// `newly_confirmed` is true only for the call that performed the
/// `Pending -> Confirmed` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed { newly_confirmed: bool },
    NotFound,
}

/// Per-client fixed-window counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub client_key: String,
    pub count: u32,
    pub window_start: DateTime<Utc>,
    pub reset_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for RateLimitRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let count: i32 = row.try_get("count")?;
        Ok(Self {
            client_key: row.try_get("client_key")?,
            count: u32::try_from(count).unwrap_or(0),
            window_start: row.try_get("window_start")?,
            reset_at: row.try_get("reset_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_db_text() {
        for status in [RegistrationStatus::Pending, RegistrationStatus::Confirmed] {
            assert_eq!(RegistrationStatus::from_db(status.as_str()).ok(), Some(status));
        }
        assert!(RegistrationStatus::from_db("deleted").is_err());
    }

    #[test]
    fn pending_record_has_no_confirmation_time() {
        let record = RegistrationRecord::pending("a@b.com".to_string(), Utc::now());
        assert_eq!(record.status, RegistrationStatus::Pending);
        assert!(record.confirmed_at.is_none());
        assert!(!record.is_confirmed());
    }
}
