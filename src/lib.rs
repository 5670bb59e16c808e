//! # Waitlist (double opt-in signup gate)
//!
//! `waitlist` accepts email signups, screens them and only counts an address
//! once its owner clicked the emailed confirmation link.
//!
//! ## Signup
//!
//! `POST /waitlist` runs each submission through, in order: a per-client
//! fixed-window rate limit, bot heuristics (honeypot field, form fill time),
//! email validation, a disposable-domain blocklist, and registration as
//! `pending`. A confirmation email with a signed link goes out last. Bot
//! submissions receive the normal success body and leave no trace.
//!
//! ## Confirmation
//!
//! `GET /waitlist/confirm?token=...` verifies an HMAC-SHA256 signed,
//! time-limited token without any server-side token storage, promotes the
//! record to `confirmed` and redirects to the status page. Redeeming a link
//! twice is harmless; the welcome email is sent once.
//!
//! ## Storage
//!
//! Registrations and rate counters sit behind store traits. Without `--dsn`
//! the process keeps them in memory; with it they live in Postgres, which is
//! what multi-instance deployments need.

pub mod api;
pub mod cli;
pub mod waitlist;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
