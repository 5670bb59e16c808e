use clap::{Arg, Command};

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_RATE_LIMIT_WINDOW_SECONDS: &str = "rate-limit-window-seconds";
pub const ARG_RATE_LIMIT_MAX_REQUESTS: &str = "rate-limit-max-requests";
pub const ARG_MIN_FILL_MILLIS: &str = "min-fill-millis";
pub const ARG_BLOCKED_DOMAINS: &str = "blocked-domains";
pub const ARG_PUBLIC_URL: &str = "public-url";
pub const ARG_STATUS_PAGE: &str = "status-page";
pub const ARG_NOTIFY_URL: &str = "notify-url";
pub const ARG_TRUSTED_PROXY_HEADER: &str = "trusted-proxy-header";
pub const ARG_TRUSTED_PROXY_HOPS: &str = "trusted-proxy-hops";

pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_gate_args(command);
    let command = with_proxy_args(command);
    with_link_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("HMAC key for confirmation tokens (at least 32 bytes)")
                .env("WAITLIST_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Confirmation token lifetime in seconds")
                .env("WAITLIST_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_gate_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .long(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .help("Signup rate limit window in seconds")
                .env("WAITLIST_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_MAX_REQUESTS)
                .long(ARG_RATE_LIMIT_MAX_REQUESTS)
                .help("Signups allowed per client per window")
                .env("WAITLIST_RATE_LIMIT_MAX_REQUESTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_MIN_FILL_MILLIS)
                .long(ARG_MIN_FILL_MILLIS)
                .help("Forms submitted faster than this after rendering are treated as bots")
                .env("WAITLIST_MIN_FILL_MILLIS")
                .default_value("3000")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_BLOCKED_DOMAINS)
                .long(ARG_BLOCKED_DOMAINS)
                .help("Comma separated disposable email domains to reject")
                .env("WAITLIST_BLOCKED_DOMAINS")
                .value_delimiter(',')
                .default_value("tempmail.org,10minutemail.com,guerrillamail.com"),
        )
}

fn with_proxy_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TRUSTED_PROXY_HEADER)
                .long(ARG_TRUSTED_PROXY_HEADER)
                .help("Address header set by our reverse proxy, e.g. x-forwarded-for; the peer address is used when unset")
                .env("WAITLIST_TRUSTED_PROXY_HEADER"),
        )
        .arg(
            Arg::new(ARG_TRUSTED_PROXY_HOPS)
                .long(ARG_TRUSTED_PROXY_HOPS)
                .help("Number of trusted proxies appending to the address header")
                .env("WAITLIST_TRUSTED_PROXY_HOPS")
                .default_value("1")
                .value_parser(clap::value_parser!(u8).range(1..)),
        )
}

fn with_link_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PUBLIC_URL)
                .long(ARG_PUBLIC_URL)
                .help("Public base URL used for confirmation links")
                .env("WAITLIST_PUBLIC_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_STATUS_PAGE)
                .long(ARG_STATUS_PAGE)
                .help("Page confirmation redirects land on")
                .env("WAITLIST_STATUS_PAGE")
                .default_value("/waitlist"),
        )
        .arg(
            Arg::new(ARG_NOTIFY_URL)
                .long(ARG_NOTIFY_URL)
                .help("HTTP relay that delivers emails; emails are only logged when unset")
                .env("WAITLIST_NOTIFY_URL"),
        )
}
