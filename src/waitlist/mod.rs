//! Double opt-in waitlist gate.
//!
//! A submission is rate limited per client, screened for bots, validated and
//! registered as `pending`; the confirmation email carries a signed token whose
//! redemption promotes the record to `confirmed`.

pub mod clock;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod registrar;
pub mod repo;
pub mod service;
pub mod spam;
pub mod token;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::error::{ConfirmationError, FieldError, SignupError, StoreError};
pub use self::models::{
    ConfirmOutcome, CreateOutcome, RateLimitRecord, RegistrationRecord, RegistrationStatus,
};
pub use self::rate_limit::{
    spawn_purge_task, Admission, MemoryRateLimitStore, RateLimitConfig, RateLimitStore,
    RateLimiter,
};
pub use self::registrar::{MemoryRegistrationStore, Registrar, RegistrationStore};
pub use self::repo::{PgRateLimitStore, PgRegistrationStore};
pub use self::service::{
    Confirmation, ConfirmationCoordinator, GateConfig, SignupCoordinator, SignupForm,
    SignupOutcome,
};
pub use self::spam::{SpamConfig, SpamFilter, SpamSignal, SpamVerdict};
pub use self::token::{TokenCodec, TokenConfig, TokenVerdict};
