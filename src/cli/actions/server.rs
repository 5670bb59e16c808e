use crate::api::{
    self,
    email::{EmailSender, LogEmailSender, WebhookEmailSender},
    handlers::{ClientIpSource, Collaborators, WaitlistState},
};
use crate::cli::telemetry;
use crate::waitlist::{
    repo, spawn_purge_task, Clock, GateConfig, MemoryRateLimitStore, MemoryRegistrationStore,
    PgRateLimitStore, PgRegistrationStore, RateLimitConfig, RateLimitStore, RegistrationStore,
    SpamConfig, SystemClock, TokenCodec, TokenConfig,
};
use anyhow::{Context, Result};
use axum::http::HeaderName;
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub token_secret: SecretString,
    pub token_ttl_seconds: u64,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_max_requests: u32,
    pub min_fill_millis: i64,
    pub blocked_domains: Vec<String>,
    pub public_url: String,
    pub status_page: String,
    pub notify_url: Option<String>,
    pub trusted_proxy_header: Option<HeaderName>,
    pub trusted_proxy_hops: u8,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the configuration is invalid
/// or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (registrations, rate_limits) = stores(args.dsn.as_deref()).await?;

    let sender: Arc<dyn EmailSender> = if let Some(url) = &args.notify_url {
        info!("Relaying emails to {url}");
        Arc::new(WebhookEmailSender::new(url)?)
    } else {
        warn!("No --notify-url configured, emails are only logged");
        Arc::new(LogEmailSender)
    };

    let codec = TokenCodec::new(
        &args.token_secret,
        TokenConfig::new().with_ttl_seconds(args.token_ttl_seconds),
    )?;

    let rate_limit = RateLimitConfig::new()
        .with_window_seconds(args.rate_limit_window_seconds)
        .with_max_requests(args.rate_limit_max_requests)
        .normalize();

    let spam = SpamConfig::new()
        .with_min_fill_millis(args.min_fill_millis)
        .with_blocked_domains(&args.blocked_domains);

    let config = GateConfig::new()
        .with_public_url(args.public_url)
        .with_status_page(args.status_page);

    let client_ip = match args.trusted_proxy_header {
        Some(name) => {
            info!(
                "Rate limiting on {name}, {} trusted hop(s)",
                args.trusted_proxy_hops
            );
            ClientIpSource::trusted_header(name, usize::from(args.trusted_proxy_hops))
        }
        None => ClientIpSource::Peer,
    };

    // Closed rate limit windows are dropped once per window length.
    spawn_purge_task(rate_limits.clone(), clock.clone(), rate_limit.window());

    let state = WaitlistState::new(
        Collaborators {
            registrations,
            rate_limits,
            sender,
            clock,
        },
        codec,
        rate_limit,
        spam,
        config,
    )
    .with_client_ip(client_ip);

    let result = api::new(args.port, Arc::new(state)).await;

    telemetry::shutdown_tracer();

    result
}

async fn stores(
    dsn: Option<&str>,
) -> Result<(Arc<dyn RegistrationStore>, Arc<dyn RateLimitStore>)> {
    let Some(dsn) = dsn else {
        warn!("No --dsn configured, waitlist state is kept in memory");
        let registrations: Arc<dyn RegistrationStore> = Arc::new(MemoryRegistrationStore::new());
        let rate_limits: Arc<dyn RateLimitStore> = Arc::new(MemoryRateLimitStore::new());
        return Ok((registrations, rate_limits));
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    repo::apply_schema(&pool)
        .await
        .context("Failed to apply waitlist schema")?;

    let registrations: Arc<dyn RegistrationStore> = Arc::new(PgRegistrationStore::new(pool.clone()));
    let rate_limits: Arc<dyn RateLimitStore> = Arc::new(PgRateLimitStore::new(pool));
    Ok((registrations, rate_limits))
}
