use super::WaitlistState;
use crate::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    storage: String,
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Registration store is reachable", body = Health),
        (status = 503, description = "Registration store is unreachable", body = Health)
    ),
    tag= "health"
)]
// axum handler for health
pub async fn health(method: Method, state: Extension<Arc<WaitlistState>>) -> impl IntoResponse {
    let result = state.registrar().ping().await;
    if let Err(error) = &result {
        error!("Registration store ping failed: {}", error);
    }

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: if result.is_ok() {
            "ok".to_string()
        } else {
            "error".to_string()
        },
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let mut headers = HeaderMap::new();
    if let Some(value) = x_app(&health) {
        debug!("X-App header: {:?}", value);
        headers.insert("X-App", value);
    }

    let status = if result.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, headers, body)
}

/// `name:version:short-commit`, the commit part empty when unknown.
fn x_app(health: &Health) -> Option<HeaderValue> {
    let short_hash = health.commit.get(..7).unwrap_or_default();
    match format!("{}:{}:{short_hash}", health.name, health.version).parse() {
        Ok(value) => Some(value),
        Err(err) => {
            error!("Failed to parse X-App header: {}", err);
            None
        }
    }
}
