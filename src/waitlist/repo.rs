//! Postgres-backed stores for deployments with more than one instance.
//!
//! Every read-modify-write is a single statement so concurrent instances
//! serialize on the row: the rate counter is an upsert, signup is
//! `INSERT ... ON CONFLICT DO NOTHING`, and confirmation only updates rows that
//! are still `pending`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgPool, Row};
use tracing::{info_span, Instrument};

use super::error::StoreError;
use super::models::{
    ConfirmOutcome, CreateOutcome, RateLimitRecord, RegistrationRecord, RegistrationStatus,
};
use super::rate_limit::{window_end, RateLimitStore};
use super::registrar::RegistrationStore;

/// Schema applied on startup when a DSN is configured. Idempotent.
pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[derive(Clone, Debug)]
pub struct PgRegistrationStore {
    pool: PgPool,
}

impl PgRegistrationStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn status_of(&self, email: &str) -> Result<Option<RegistrationStatus>, StoreError> {
        let query = "SELECT status FROM waitlist_entries WHERE email = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        match row {
            Some(row) => {
                let status: String = row.try_get("status")?;
                Ok(Some(RegistrationStatus::from_db(&status)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RegistrationStore for PgRegistrationStore {
    async fn create_pending(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome, StoreError> {
        let query = r"
            INSERT INTO waitlist_entries (email, status, created_at)
            VALUES ($1, 'pending', $2)
            ON CONFLICT (email) DO NOTHING
            RETURNING email
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let inserted = sqlx::query(query)
            .bind(email)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        if inserted.is_some() {
            return Ok(CreateOutcome::Created);
        }

        match self.status_of(email).await? {
            Some(RegistrationStatus::Pending) => Ok(CreateOutcome::AlreadyPending),
            Some(RegistrationStatus::Confirmed) => Ok(CreateOutcome::AlreadyConfirmed),
            None => Err(StoreError::Unavailable(format!(
                "waitlist entry for {email} conflicted but could not be read"
            ))),
        }
    }

    async fn find(&self, email: &str) -> Result<Option<RegistrationRecord>, StoreError> {
        let query = r"
            SELECT email, status, created_at, confirmed_at
            FROM waitlist_entries
            WHERE email = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let record = sqlx::query_as::<_, RegistrationRecord>(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(record)
    }

    async fn confirm(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, StoreError> {
        let query = r"
            UPDATE waitlist_entries
            SET status = 'confirmed',
                confirmed_at = $2
            WHERE email = $1
              AND status = 'pending'
            RETURNING email
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let updated = sqlx::query(query)
            .bind(email)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        if updated.is_some() {
            return Ok(ConfirmOutcome::Confirmed {
                newly_confirmed: true,
            });
        }

        match self.status_of(email).await? {
            Some(RegistrationStatus::Confirmed) => Ok(ConfirmOutcome::Confirmed {
                newly_confirmed: false,
            }),
            Some(RegistrationStatus::Pending) => Err(StoreError::Unavailable(format!(
                "waitlist entry for {email} stayed pending after confirm"
            ))),
            None => Ok(ConfirmOutcome::NotFound),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct PgRateLimitStore {
    pool: PgPool,
}

impl PgRateLimitStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitStore for PgRateLimitStore {
    async fn hit(
        &self,
        client_key: &str,
        now: DateTime<Utc>,
        window: chrono::Duration,
        limit: u32,
    ) -> Result<RateLimitRecord, StoreError> {
        let query = r"
            INSERT INTO waitlist_rate_limits AS rl (client_key, count, window_start, reset_at)
            VALUES ($1, 1, $2, $3)
            ON CONFLICT (client_key) DO UPDATE
            SET count = CASE WHEN $2 > rl.reset_at THEN 1 ELSE LEAST(rl.count + 1, $4) END,
                window_start = CASE WHEN $2 > rl.reset_at THEN $2 ELSE rl.window_start END,
                reset_at = CASE WHEN $2 > rl.reset_at THEN $3 ELSE rl.reset_at END
            RETURNING client_key, count, window_start, reset_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.statement = query
        );
        let reset_at = window_end(now, window)?;
        let cap = i32::try_from(limit.saturating_add(1)).unwrap_or(i32::MAX);
        let record = sqlx::query_as::<_, RateLimitRecord>(query)
            .bind(client_key)
            .bind(now)
            .bind(reset_at)
            .bind(cap)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(record)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let query = "DELETE FROM waitlist_rate_limits WHERE reset_at < $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Apply [`SCHEMA_SQL`] statement by statement.
///
/// # Errors
/// Returns an error if any statement fails.
pub async fn apply_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in split_sql_statements(SCHEMA_SQL) {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DDL"
        );
        sqlx::query(&statement)
            .execute(pool)
            .instrument(span)
            .await?;
    }
    Ok(())
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_splits_into_statements() {
        let statements = split_sql_statements(SCHEMA_SQL);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS waitlist_entries"));
        assert!(statements.iter().all(|statement| statement.ends_with(';')));
    }

    #[test]
    fn split_ignores_comments_and_keeps_leftover() {
        let statements = split_sql_statements("-- header\nSELECT 1;\nSELECT 2");
        assert_eq!(statements, vec!["SELECT 1;".to_string(), "SELECT 2".to_string()]);
    }
}
