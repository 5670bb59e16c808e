use axum::{
    extract::{ConnectInfo, Extension},
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::Value;
use std::{net::SocketAddr, sync::Arc};
use tracing::{error, instrument};

use super::types::{ErrorResponse, FieldErrorBody, SignupRequest, SignupResponse};
use super::{client_key, WaitlistState};
use crate::waitlist::{SignupError, SignupForm, SignupOutcome};

const MSG_ACCEPTED: &str = "Please check your email for confirmation.";
const MSG_RESENT: &str = "Confirmation email resent. Please check your inbox.";
const MSG_VALIDATION: &str = "Validation failed";
const MSG_BLOCKED_DOMAIN: &str = "Please use a valid email address.";
const MSG_RATE_LIMITED: &str = "Too many requests. Please try again later.";
const MSG_DUPLICATE: &str = "This email is already registered.";
const MSG_REGISTRATION_FAILED: &str = "Failed to process registration. Please try again.";
const MSG_NOTIFICATION_FAILED: &str = "Failed to send confirmation email. Please try again.";

/// Join the waitlist. Bot submissions get the same answer as real ones.
#[utoipa::path(
    post,
    path = "/waitlist",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Confirmation email sent", body = SignupResponse),
        (status = 400, description = "Invalid payload or disposable email domain", body = ErrorResponse),
        (status = 405, description = "Method not allowed", body = ErrorResponse),
        (status = 409, description = "Email already confirmed", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 500, description = "Storage or email delivery failure", body = ErrorResponse)
    ),
    tag = "waitlist"
)]
#[instrument(skip(headers, peer, state, payload))]
pub async fn signup(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<WaitlistState>>,
    payload: Option<Json<Value>>,
) -> Response {
    // A missing or unparsable body reads as an empty one.
    let body = payload.map_or(Value::Null, |Json(body)| body);
    let (request, type_errors) = SignupRequest::from_json(&body);
    let client_key = client_key(&headers, peer.as_ref(), state.client_ip());

    let form = SignupForm {
        email: request.email.as_deref(),
        honeypot: request.honeypot.as_deref(),
        rendered_at_millis: request.timestamp,
        type_errors: &type_errors,
    };

    match state.signup().submit(&client_key, &form).await {
        Ok(SignupOutcome::Accepted | SignupOutcome::AcceptedSilently(_)) => success(MSG_ACCEPTED),
        Ok(SignupOutcome::Resent) => success(MSG_RESENT),
        Err(err) => signup_error_response(&err),
    }
}

fn success(message: &str) -> Response {
    (
        StatusCode::OK,
        Json(SignupResponse {
            success: true,
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn signup_error_response(err: &SignupError) -> Response {
    match err {
        SignupError::Validation(details) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::with_details(
                MSG_VALIDATION,
                details.iter().map(FieldErrorBody::from).collect(),
            )),
        )
            .into_response(),
        SignupError::BlockedDomain(_) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(MSG_BLOCKED_DOMAIN)),
        )
            .into_response(),
        SignupError::RateLimited {
            retry_after_seconds,
        } => {
            let mut headers = HeaderMap::new();
            headers.insert(RETRY_AFTER, HeaderValue::from(*retry_after_seconds));
            (
                StatusCode::TOO_MANY_REQUESTS,
                headers,
                Json(ErrorResponse::new(MSG_RATE_LIMITED)),
            )
                .into_response()
        }
        SignupError::DuplicateConfirmed => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(MSG_DUPLICATE)),
        )
            .into_response(),
        SignupError::Registration(source) => {
            error!("Failed to store waitlist entry: {source}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(MSG_REGISTRATION_FAILED)),
            )
                .into_response()
        }
        SignupError::Notification(source) => {
            error!("Failed to send confirmation email: {source:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(MSG_NOTIFICATION_FAILED)),
            )
                .into_response()
        }
    }
}
