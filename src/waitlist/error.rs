use thiserror::Error;

/// Failure reported by a registration or rate-limit backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A single field-level validation failure, surfaced as `details` in 400 bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

/// Terminal failure exits of the signup flow.
#[derive(Debug, Error)]
pub enum SignupError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error("disposable email domain: {0}")]
    BlockedDomain(String),
    #[error("rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },
    #[error("email already confirmed")]
    DuplicateConfirmed,
    #[error("registration failed: {0}")]
    Registration(#[source] StoreError),
    #[error("confirmation email failed: {0}")]
    Notification(#[source] anyhow::Error),
}

/// Terminal failure exits of the confirmation flow.
#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error("malformed confirmation token")]
    TokenMalformed,
    #[error("confirmation token expired for {email}")]
    TokenExpired { email: String },
    #[error("no pending registration for {email}")]
    NotFound { email: String },
    #[error("confirmation failed: {0}")]
    Registration(#[source] StoreError),
}
