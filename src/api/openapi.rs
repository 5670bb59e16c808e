use super::handlers::{confirm, health, signup, types};
use utoipa::OpenApi;

/// Served at `/api-docs/openapi.json`. The info block comes from Cargo metadata.
#[derive(OpenApi)]
#[openapi(
    paths(health::health, signup::signup, confirm::confirm),
    components(schemas(
        health::Health,
        types::SignupRequest,
        types::SignupResponse,
        types::ErrorResponse,
        types::FieldErrorBody
    )),
    tags(
        (name = "waitlist", description = "Double opt-in waitlist signup"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_waitlist_routes() {
        let doc = openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        assert!(paths.contains(&"/health"));
        assert!(paths.contains(&"/waitlist"));
        assert!(paths.contains(&"/waitlist/confirm"));
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
    }
}
