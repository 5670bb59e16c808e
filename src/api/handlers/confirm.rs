use axum::{
    extract::{Extension, Query},
    response::Redirect,
};
use std::sync::Arc;
use tracing::{debug, error, instrument};

use super::types::ConfirmQuery;
use super::WaitlistState;
use crate::waitlist::{Confirmation, ConfirmationError, GateConfig};

/// Redeem a confirmation link and redirect to the status page.
#[utoipa::path(
    get,
    path = "/waitlist/confirm",
    params(ConfirmQuery),
    responses(
        (status = 303, description = "Redirect to the status page with `status=confirmed` or `error=<code>`"),
        (status = 405, description = "Method not allowed", body = super::types::ErrorResponse)
    ),
    tag = "waitlist"
)]
#[instrument(skip(state, query))]
pub async fn confirm(
    state: Extension<Arc<WaitlistState>>,
    query: Option<Query<ConfirmQuery>>,
) -> Redirect {
    let token = query.and_then(|Query(query)| query.token);
    let result = state.confirmation().confirm(token.as_deref()).await;
    Redirect::to(&location(state.config(), &result))
}

fn location(config: &GateConfig, result: &Result<Confirmation, ConfirmationError>) -> String {
    match result {
        Ok(confirmation) => {
            debug!(
                newly_confirmed = confirmation.newly_confirmed,
                "confirmation redeemed"
            );
            config.status_location("status", "confirmed")
        }
        Err(ConfirmationError::TokenMalformed) => config.status_location("error", "invalid_token"),
        Err(ConfirmationError::TokenExpired { email }) => {
            debug!(email = %email, "confirmation token expired");
            config.status_location("error", "token_expired")
        }
        Err(ConfirmationError::NotFound { email }) => {
            error!(email = %email, "valid token for unknown waitlist entry");
            config.status_location("error", "confirmation_failed")
        }
        Err(ConfirmationError::Registration(source)) => {
            error!("Failed to confirm waitlist entry: {source}");
            config.status_location("error", "server_error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waitlist::StoreError;

    #[test]
    fn maps_outcomes_to_status_page() {
        let config = GateConfig::new();
        let cases = [
            (
                Ok(Confirmation {
                    email: "a@b.com".to_string(),
                    newly_confirmed: false,
                }),
                "/waitlist?status=confirmed",
            ),
            (
                Err(ConfirmationError::TokenMalformed),
                "/waitlist?error=invalid_token",
            ),
            (
                Err(ConfirmationError::TokenExpired {
                    email: "a@b.com".to_string(),
                }),
                "/waitlist?error=token_expired",
            ),
            (
                Err(ConfirmationError::NotFound {
                    email: "a@b.com".to_string(),
                }),
                "/waitlist?error=confirmation_failed",
            ),
            (
                Err(ConfirmationError::Registration(StoreError::Unavailable(
                    "offline".to_string(),
                ))),
                "/waitlist?error=server_error",
            ),
        ];
        for (result, expected) in cases {
            assert_eq!(location(&config, &result), expected);
        }
    }
}
