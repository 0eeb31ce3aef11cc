//! API error taxonomy.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Errors returned by [`ApiClient`](super::ApiClient) calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received (connection refused, DNS, timeout).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server rejected the credentials and no refresh was attempted.
    #[error("Authentication required: {0}")]
    AuthExpired(String),

    /// The session could not be refreshed; the user must sign in again.
    #[error("Session is no longer valid")]
    AuthInvalid,

    /// The request was understood but rejected (4xx with detail).
    #[error("Validation failed ({status}): {detail}")]
    Validation {
        status: StatusCode,
        detail: String,
        fields: Vec<FieldError>,
    },

    /// The user lacks permission for this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The referenced resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Too many requests.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The backend failed (5xx).
    #[error("Server error ({status}): {message}")]
    Server { status: StatusCode, message: String },

    /// The response body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A request path could not be joined onto the base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// Whether the referenced entity is missing (full-page "not found" state).
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the user needs to sign in again.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::AuthExpired(_) | Self::AuthInvalid)
    }

    /// Whether retrying the same action later may succeed, i.e. a transient
    /// notification is enough.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited(_) | Self::Server { .. }
        )
    }

    /// Classify a non-success response.
    pub(crate) fn from_response(status: StatusCode, body: &str, retry_after: Option<u64>) -> Self {
        let detail = ErrorBody::parse(body);

        match status {
            StatusCode::UNAUTHORIZED => Self::AuthExpired(detail.message),
            StatusCode::FORBIDDEN => Self::Forbidden(detail.message),
            StatusCode::NOT_FOUND => Self::NotFound(detail.message),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited(retry_after.unwrap_or(1)),
            s if s.is_server_error() => Self::Server {
                status: s,
                message: detail.message,
            },
            s => Self::Validation {
                status: s,
                detail: detail.message,
                fields: detail.fields,
            },
        }
    }
}

/// A field-level validation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted location, e.g. `body.quantity`.
    pub field: String,
    pub message: String,
}

/// Parsed error body.
///
/// The backend answers with either `{"detail": "text"}` or, for schema
/// validation failures, `{"detail": [{"loc": [...], "msg": "..."}]}`.
#[derive(Debug, Default)]
struct ErrorBody {
    message: String,
    fields: Vec<FieldError>,
}

#[derive(Deserialize)]
struct RawErrorBody {
    detail: RawDetail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDetail {
    Text(String),
    Fields(Vec<RawFieldError>),
}

#[derive(Deserialize)]
struct RawFieldError {
    #[serde(default)]
    loc: Vec<serde_json::Value>,
    msg: String,
}

impl ErrorBody {
    fn parse(body: &str) -> Self {
        match serde_json::from_str::<RawErrorBody>(body) {
            Ok(RawErrorBody {
                detail: RawDetail::Text(message),
            }) => Self {
                message,
                fields: Vec::new(),
            },
            Ok(RawErrorBody {
                detail: RawDetail::Fields(raw),
            }) => {
                let fields: Vec<FieldError> = raw
                    .into_iter()
                    .map(|f| FieldError {
                        field: f
                            .loc
                            .iter()
                            .map(|p| match p {
                                serde_json::Value::String(s) => s.clone(),
                                other => other.to_string(),
                            })
                            .collect::<Vec<_>>()
                            .join("."),
                        message: f.msg,
                    })
                    .collect();
                let message = fields
                    .iter()
                    .map(|f| format!("{}: {}", f.field, f.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                Self { message, fields }
            }
            Err(_) => Self {
                message: body.chars().take(200).collect(),
                fields: Vec::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_detail() {
        let err = ApiError::from_response(
            StatusCode::NOT_FOUND,
            r#"{"detail": "Product not found"}"#,
            None,
        );
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: Product not found");
    }

    #[test]
    fn test_field_detail() {
        let err = ApiError::from_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"detail": [{"loc": ["body", "quantity"], "msg": "must be positive", "type": "value_error"}]}"#,
            None,
        );
        let ApiError::Validation { status, detail, fields } = err else {
            panic!("expected validation error");
        };
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(detail, "body.quantity: must be positive");
        assert_eq!(
            fields,
            vec![FieldError {
                field: "body.quantity".to_string(),
                message: "must be positive".to_string(),
            }]
        );
    }

    #[test]
    fn test_non_json_body_is_truncated() {
        let body = "x".repeat(500);
        let err = ApiError::from_response(StatusCode::BAD_GATEWAY, &body, None);
        let ApiError::Server { message, .. } = &err else {
            panic!("expected server error");
        };
        assert_eq!(message.len(), 200);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ApiError::from_response(StatusCode::UNAUTHORIZED, "", None),
            ApiError::AuthExpired(_)
        ));
        assert!(matches!(
            ApiError::from_response(StatusCode::FORBIDDEN, "", None),
            ApiError::Forbidden(_)
        ));
        assert!(matches!(
            ApiError::from_response(StatusCode::TOO_MANY_REQUESTS, "", Some(30)),
            ApiError::RateLimited(30)
        ));
        assert!(matches!(
            ApiError::from_response(StatusCode::BAD_REQUEST, r#"{"detail": "Login already exists"}"#, None),
            ApiError::Validation { .. }
        ));
    }

    #[test]
    fn test_auth_classification() {
        assert!(ApiError::AuthInvalid.is_auth());
        assert!(!ApiError::AuthInvalid.is_recoverable());
        assert!(!ApiError::NotFound(String::new()).is_auth());
    }
}
