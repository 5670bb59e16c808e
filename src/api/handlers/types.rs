//! Request/response types for waitlist endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::waitlist::FieldError;

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct SignupRequest {
    pub email: Option<String>,
    /// Hidden form field. Humans leave it empty.
    pub honeypot: Option<String>,
    /// Unix milliseconds at which the form was rendered.
    pub timestamp: Option<i64>,
}

impl SignupRequest {
    /// Read each field on its own so one mistyped field is reported by name
    /// instead of discarding the whole body. `null` counts as absent. A body
    /// that is not an object reads as empty.
    #[must_use]
    pub fn from_json(body: &Value) -> (Self, Vec<FieldError>) {
        let mut errors = Vec::new();
        let Some(fields) = body.as_object() else {
            return (Self::default(), errors);
        };

        let request = Self {
            email: string_field(fields.get("email"), "email", &mut errors),
            honeypot: string_field(fields.get("honeypot"), "honeypot", &mut errors),
            timestamp: integer_field(fields.get("timestamp"), "timestamp", &mut errors),
        };
        (request, errors)
    }
}

fn string_field(
    value: Option<&Value>,
    field: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(value)) => Some(value.clone()),
        Some(_) => {
            errors.push(FieldError {
                field,
                message: "Expected string",
            });
            None
        }
    }
}

fn integer_field(
    value: Option<&Value>,
    field: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<i64> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => {
            let parsed = number.as_i64();
            if parsed.is_none() {
                errors.push(FieldError {
                    field,
                    message: "Expected integer",
                });
            }
            parsed
        }
        Some(_) => {
            errors.push(FieldError {
                field,
                message: "Expected number",
            });
            None
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupResponse {
    pub success: bool,
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct FieldErrorBody {
    pub field: String,
    pub message: String,
}

impl From<&FieldError> for FieldErrorBody {
    fn from(error: &FieldError) -> Self {
        Self {
            field: error.field.to_string(),
            message: error.message.to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldErrorBody>>,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(error: &str, details: Vec<FieldErrorBody>) -> Self {
        Self {
            error: error.to_string(),
            details: Some(details),
        }
    }
}

#[derive(IntoParams, Deserialize, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct ConfirmQuery {
    /// Token from the confirmation email.
    pub token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn error_without_details_omits_field() -> Result<()> {
        let value = serde_json::to_value(ErrorResponse::new("Method not allowed"))?;
        assert_eq!(value, serde_json::json!({ "error": "Method not allowed" }));
        Ok(())
    }

    #[test]
    fn signup_request_fields_are_optional() -> Result<()> {
        let request: SignupRequest = serde_json::from_str(r#"{"email":"a@b.com"}"#)?;
        assert_eq!(request.email.as_deref(), Some("a@b.com"));
        assert!(request.honeypot.is_none());
        assert!(request.timestamp.is_none());
        Ok(())
    }

    #[test]
    fn from_json_reads_well_typed_body() {
        let body = serde_json::json!({
            "email": "a@b.com",
            "honeypot": null,
            "timestamp": 1_699_999_990_000_i64
        });
        let (request, errors) = SignupRequest::from_json(&body);
        assert!(errors.is_empty());
        assert_eq!(request.email.as_deref(), Some("a@b.com"));
        assert!(request.honeypot.is_none());
        assert_eq!(request.timestamp, Some(1_699_999_990_000));
    }

    #[test]
    fn from_json_names_each_mistyped_field() {
        let body = serde_json::json!({
            "email": "ok@example.com",
            "honeypot": 7,
            "timestamp": "1699999990000"
        });
        let (request, errors) = SignupRequest::from_json(&body);
        assert_eq!(request.email.as_deref(), Some("ok@example.com"));
        assert_eq!(
            errors,
            vec![
                FieldError {
                    field: "honeypot",
                    message: "Expected string"
                },
                FieldError {
                    field: "timestamp",
                    message: "Expected number"
                },
            ]
        );
    }

    #[test]
    fn from_json_rejects_fractional_timestamp_and_non_string_email() {
        let body = serde_json::json!({ "email": ["a@b.com"], "timestamp": 1.5 });
        let (request, errors) = SignupRequest::from_json(&body);
        assert!(request.email.is_none());
        assert_eq!(
            errors.iter().map(|e| (e.field, e.message)).collect::<Vec<_>>(),
            vec![("email", "Expected string"), ("timestamp", "Expected integer")]
        );
    }

    #[test]
    fn from_json_treats_non_object_as_empty() {
        for body in [Value::Null, serde_json::json!([1, 2]), serde_json::json!("x")] {
            let (request, errors) = SignupRequest::from_json(&body);
            assert!(request.email.is_none());
            assert!(errors.is_empty());
        }
    }
}
