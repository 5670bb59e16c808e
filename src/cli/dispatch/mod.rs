//! Map validated CLI matches to the server action and its configuration.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::waitlist::{
    ARG_BLOCKED_DOMAINS, ARG_MIN_FILL_MILLIS, ARG_NOTIFY_URL, ARG_PUBLIC_URL,
    ARG_RATE_LIMIT_MAX_REQUESTS, ARG_RATE_LIMIT_WINDOW_SECONDS, ARG_STATUS_PAGE, ARG_TOKEN_SECRET,
    ARG_TOKEN_TTL_SECONDS, ARG_TRUSTED_PROXY_HEADER, ARG_TRUSTED_PROXY_HOPS,
};
use crate::waitlist::token::MIN_SECRET_LENGTH;
use anyhow::{anyhow, Context, Result};
use axum::http::HeaderName;
use secrecy::SecretString;
use url::Url;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .map(|dsn| dsn.trim().to_string())
        .filter(|dsn| !dsn.is_empty());

    let token_secret = matches
        .get_one::<String>(ARG_TOKEN_SECRET)
        .context("missing required argument: --token-secret")?;
    if token_secret.len() < MIN_SECRET_LENGTH {
        return Err(anyhow!(
            "--{ARG_TOKEN_SECRET} must be at least {MIN_SECRET_LENGTH} bytes"
        ));
    }

    let public_url = matches
        .get_one::<String>(ARG_PUBLIC_URL)
        .cloned()
        .context("missing required argument: --public-url")?;
    Url::parse(&public_url).with_context(|| format!("invalid --{ARG_PUBLIC_URL}: {public_url}"))?;

    let notify_url = matches.get_one::<String>(ARG_NOTIFY_URL).cloned();
    if let Some(url) = &notify_url {
        Url::parse(url).with_context(|| format!("invalid --{ARG_NOTIFY_URL}: {url}"))?;
    }

    let trusted_proxy_header = matches
        .get_one::<String>(ARG_TRUSTED_PROXY_HEADER)
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .map(|name| {
            HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid --{ARG_TRUSTED_PROXY_HEADER}: {name}"))
        })
        .transpose()?;

    Ok(Action::Server(Args {
        port,
        dsn,
        token_secret: SecretString::from(token_secret.clone()),
        token_ttl_seconds: matches
            .get_one::<u64>(ARG_TOKEN_TTL_SECONDS)
            .copied()
            .unwrap_or(86_400),
        rate_limit_window_seconds: matches
            .get_one::<u64>(ARG_RATE_LIMIT_WINDOW_SECONDS)
            .copied()
            .unwrap_or(900),
        rate_limit_max_requests: matches
            .get_one::<u32>(ARG_RATE_LIMIT_MAX_REQUESTS)
            .copied()
            .unwrap_or(5),
        min_fill_millis: matches
            .get_one::<i64>(ARG_MIN_FILL_MILLIS)
            .copied()
            .unwrap_or(3_000),
        blocked_domains: matches
            .get_many::<String>(ARG_BLOCKED_DOMAINS)
            .map(|domains| domains.cloned().collect())
            .unwrap_or_default(),
        public_url,
        status_page: matches
            .get_one::<String>(ARG_STATUS_PAGE)
            .cloned()
            .unwrap_or_else(|| "/waitlist".to_string()),
        notify_url,
        trusted_proxy_header,
        trusted_proxy_hops: matches
            .get_one::<u8>(ARG_TRUSTED_PROXY_HOPS)
            .copied()
            .unwrap_or(1),
    }))
}
