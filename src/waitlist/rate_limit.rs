//! Fixed-window rate limiting for signup submissions.
//!
//! Each client key gets a counter that resets once the current time passes the
//! stored `reset_at`. A client can spend the whole cap at the end of one window
//! and again right after it resets; this is an abuse deterrent, not fair-share
//! accounting.
//!
//! The counter itself lives behind [`RateLimitStore`]. `MemoryRateLimitStore`
//! only protects a single instance; multi-instance deployments use the
//! Postgres store in [`super::repo`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use super::clock::Clock;
use super::error::StoreError;
use super::models::RateLimitRecord;

const DEFAULT_WINDOW_SECONDS: u64 = 15 * 60;
const DEFAULT_MAX_REQUESTS: u32 = 5;
const MAX_WINDOW_SECONDS: u64 = 30 * 24 * 60 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    window: Duration,
    max_requests: u32,
}

impl RateLimitConfig {
    /// Default policy: 5 requests per client per 15 minutes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            window: Duration::from_secs(DEFAULT_WINDOW_SECONDS),
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }

    #[must_use]
    pub fn with_window_seconds(mut self, seconds: u64) -> Self {
        self.window = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Clamp the window to between one second and 30 days and require at
    /// least one request per window.
    #[must_use]
    pub fn normalize(self) -> Self {
        let window = self
            .window
            .clamp(Duration::from_secs(1), Duration::from_secs(MAX_WINDOW_SECONDS));
        Self {
            window,
            max_requests: self.max_requests.max(1),
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    fn chrono_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.window)
            .unwrap_or_else(|_| chrono::Duration::days(30))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied { retry_after_seconds: u64 },
}

/// End of a window opened at `now`, or an error when it leaves the
/// representable time range.
pub(crate) fn window_end(
    now: DateTime<Utc>,
    window: chrono::Duration,
) -> Result<DateTime<Utc>, StoreError> {
    now.checked_add_signed(window).ok_or_else(|| {
        StoreError::Unavailable(format!("rate limit window of {window} overflows {now}"))
    })
}

/// Atomic get-and-increment over per-client counters.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request for `client_key` and return the record after the hit.
    ///
    /// A missing record, or one whose `reset_at` is before `now`, restarts at
    /// `count = 1` with `reset_at = now + window`. Otherwise the count grows by
    /// one, saturating at `limit + 1` so denied clients cannot overflow it.
    /// Implementations must perform the read-modify-write atomically per key.
    async fn hit(
        &self,
        client_key: &str,
        now: DateTime<Utc>,
        window: chrono::Duration,
        limit: u32,
    ) -> Result<RateLimitRecord, StoreError>;

    /// Drop records whose window closed before `now`; returns how many went.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    records: DashMap<String, RateLimitRecord>,
}

impl MemoryRateLimitStore {
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
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(
        &self,
        client_key: &str,
        now: DateTime<Utc>,
        window: chrono::Duration,
        limit: u32,
    ) -> Result<RateLimitRecord, StoreError> {
        let reset_at = window_end(now, window)?;

        // The entry guard holds the shard lock for the whole update.
        let mut record = self
            .records
            .entry(client_key.to_string())
            .or_insert_with(|| RateLimitRecord {
                client_key: client_key.to_string(),
                count: 0,
                window_start: now,
                reset_at,
            });

        if record.count == 0 || now > record.reset_at {
            record.count = 1;
            record.window_start = now;
            record.reset_at = reset_at;
        } else {
            record.count = record.count.saturating_add(1).min(limit.saturating_add(1));
        }

        Ok(record.clone())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, record| record.reset_at >= now);
        Ok(u64::try_from(before.saturating_sub(self.records.len())).unwrap_or(0))
    }
}

/// Spawn a background task that periodically drops closed rate-limit windows.
pub fn spawn_purge_task(
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.purge_expired(clock.now()).await {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "purged expired rate limit windows"),
                Err(err) => error!("rate limit purge failed: {err}"),
            }
        }
    })
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config: config.normalize(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit or deny one request for `client_key`.
    ///
    /// Store failures fail closed.
    pub async fn admit(&self, client_key: &str) -> Admission {
        let now = self.clock.now();
        let limit = self.config.max_requests();

        match self
            .store
            .hit(client_key, now, self.config.chrono_window(), limit)
            .await
        {
            Ok(record) if record.count <= limit => {
                debug!(client_key, count = record.count, "rate limit admitted");
                Admission::Allowed
            }
            Ok(record) => {
                let remaining = (record.reset_at - now).num_seconds().max(1);
                Admission::Denied {
                    retry_after_seconds: u64::try_from(remaining).unwrap_or(1),
                }
            }
            Err(err) => {
                error!("Failed to update rate limit counter: {err}");
                Admission::Denied {
                    retry_after_seconds: self.config.window().as_secs(),
                }
            }
        }
    }
}
