//! API handlers and the state they share.

pub mod confirm;
pub mod health;
pub mod signup;
pub mod types;

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Json},
};
use std::{net::SocketAddr, sync::Arc};

use crate::api::email::EmailSender;
use crate::waitlist::{
    Clock, ConfirmationCoordinator, GateConfig, RateLimitConfig, RateLimitStore, RateLimiter,
    Registrar, RegistrationStore, SignupCoordinator, SpamConfig, SpamFilter, TokenCodec,
};

use self::types::ErrorResponse;

const UNKNOWN_CLIENT: &str = "unknown";

/// Backends and side channels the gate runs against.
pub struct Collaborators {
    pub registrations: Arc<dyn RegistrationStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub sender: Arc<dyn EmailSender>,
    pub clock: Arc<dyn Clock>,
}

/// Where the rate-limit client key is read from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ClientIpSource {
    /// TCP peer address of the connection.
    #[default]
    Peer,
    /// Comma separated address list maintained by reverse proxies we run.
    /// Each proxy appends the address it received the request from, so the
    /// entry `hops` places from the right is the one our outermost proxy saw.
    /// Entries further left are written by the client.
    TrustedHeader { name: HeaderName, hops: usize },
}

impl ClientIpSource {
    #[must_use]
    pub fn trusted_header(name: HeaderName, hops: usize) -> Self {
        Self::TrustedHeader {
            name,
            hops: hops.max(1),
        }
    }
}

/// Everything the waitlist handlers need, shared behind one `Arc`.
pub struct WaitlistState {
    signup: SignupCoordinator,
    confirmation: ConfirmationCoordinator,
    registrar: Arc<Registrar>,
    config: GateConfig,
    client_ip: ClientIpSource,
}

impl WaitlistState {
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        codec: TokenCodec,
        rate_limit: RateLimitConfig,
        spam: SpamConfig,
        config: GateConfig,
    ) -> Self {
        let Collaborators {
            registrations,
            rate_limits,
            sender,
            clock,
        } = collaborators;

        let codec = Arc::new(codec);
        let registrar = Arc::new(Registrar::new(registrations, clock.clone()));
        let limiter = Arc::new(RateLimiter::new(rate_limits, clock.clone(), rate_limit));

        let signup = SignupCoordinator::new(
            limiter,
            Arc::new(SpamFilter::new(spam)),
            registrar.clone(),
            codec.clone(),
            sender.clone(),
            clock.clone(),
            config.clone(),
        );
        let confirmation = ConfirmationCoordinator::new(codec, registrar.clone(), sender, clock);

        Self {
            signup,
            confirmation,
            registrar,
            config,
            client_ip: ClientIpSource::Peer,
        }
    }

    #[must_use]
    pub fn with_client_ip(mut self, client_ip: ClientIpSource) -> Self {
        self.client_ip = client_ip;
        self
    }

    #[must_use]
    pub fn signup(&self) -> &SignupCoordinator {
        &self.signup
    }

    #[must_use]
    pub fn confirmation(&self) -> &ConfirmationCoordinator {
        &self.confirmation
    }

    #[must_use]
    pub fn registrar(&self) -> &Registrar {
        &self.registrar
    }

    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    #[must_use]
    pub fn client_ip(&self) -> &ClientIpSource {
        &self.client_ip
    }
}

/// Identify the client for rate limiting.
///
/// Forwarding headers are only read when configured as trusted, and then only
/// the proxy-appended entry counts. Anything unusable falls back to the peer
/// address, then to `unknown`.
pub fn client_key(
    headers: &HeaderMap,
    peer: Option<&ConnectInfo<SocketAddr>>,
    source: &ClientIpSource,
) -> String {
    if let ClientIpSource::TrustedHeader { name, hops } = source {
        if let Some(address) = proxied_address(headers, name, *hops) {
            return address;
        }
    }

    peer.map_or_else(
        || UNKNOWN_CLIENT.to_string(),
        |ConnectInfo(addr)| addr.ip().to_string(),
    )
}

fn proxied_address(headers: &HeaderMap, name: &HeaderName, hops: usize) -> Option<String> {
    let entries: Vec<&str> = headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .collect();

    let index = entries.len().checked_sub(hops.max(1))?;
    entries
        .get(index)
        .filter(|entry| !entry.is_empty())
        .map(|entry| (*entry).to_string())
}

/// Fallback for unsupported methods on waitlist routes.
pub async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse::new("Method not allowed")),
    )
}
