//! Unified error type for everything that talks to the storefront API.
//!
//! Every failed call is classified exactly once, at the transport boundary,
//! by [`ApiError::from_status`] (HTTP status + body) or by the `From`
//! conversions (transport, JSON, storage). Callers match on variants instead
//! of inspecting raw responses.

use std::collections::BTreeMap;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced by the session layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received (connect failure, timeout, reset).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The credential is missing, invalid or expired (HTTP 401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The credential is valid but lacks privilege (HTTP 403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The mutation was already applied (HTTP 409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller-supplied data was rejected, locally or by the server
    /// (HTTP 400/422).
    #[error("validation failed: {message}")]
    Validation {
        /// Summary message.
        message: String,
        /// Offending field → message.
        fields: BTreeMap<String, String>,
    },

    /// The resource does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The server failed (HTTP 5xx). Retryable.
    #[error("server error (HTTP {status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message from the response body, if any.
        message: String,
    },

    /// Any other non-success status.
    #[error("unexpected HTTP {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Message from the response body, if any.
        message: String,
    },

    /// Authorization failed terminally and the session was torn down.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// A protected call was made with no credential.
    #[error("not signed in")]
    NotSignedIn,

    /// A response body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Local persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The request could not be built (bad header value, bad URL).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Error body shapes used by the API: `{"message": ...}` with an optional
/// `{"errors": {field: message}}` map on validation failures.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
    error: Option<String>,
    #[serde(default)]
    errors: BTreeMap<String, serde_json::Value>,
}

impl ApiError {
    /// Classify a non-success response.
    #[must_use]
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
        let message = envelope
            .message
            .or(envelope.error)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });

        match status.as_u16() {
            400 | 422 => Self::Validation {
                message,
                fields: envelope
                    .errors
                    .into_iter()
                    .map(|(field, value)| {
                        let text = match value {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (field, text)
                    })
                    .collect(),
            },
            401 => Self::Unauthorized(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            500..=599 => Self::Server {
                status: status.as_u16(),
                message,
            },
            other => Self::UnexpectedStatus {
                status: other,
                message,
            },
        }
    }

    /// A validation error for a single field, raised before any request.
    #[must_use]
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), message.clone());
        Self::Validation { message, fields }
    }

    /// Transient failures that are retried with backoff inside a call.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }

    /// Whether the UI should send the user to the sign-in screen.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_) | Self::SessionExpired(_) | Self::NotSignedIn
        )
    }

    /// Per-field validation messages, empty for every other variant.
    #[must_use]
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        match self {
            Self::Validation { fields, .. } => fields.clone(),
            _ => BTreeMap::new(),
        }
    }

    /// Message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) | Self::Server { .. } => {
                "Could not reach the store. Check your connection and try again.".to_string()
            }
            Self::Unauthorized(_) | Self::SessionExpired(_) | Self::NotSignedIn => {
                "Your session has ended. Please sign in again.".to_string()
            }
            Self::Forbidden(message)
            | Self::Conflict(message)
            | Self::NotFound(message)
            | Self::Validation { message, .. } => message.clone(),
            Self::UnexpectedStatus { .. }
            | Self::Parse(_)
            | Self::Storage(_)
            | Self::InvalidRequest(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_auth_statuses() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"message": "token expirado"}"#);
        assert!(matches!(&err, ApiError::Unauthorized(m) if m == "token expirado"));
        assert!(err.requires_login());

        let err = ApiError::from_status(StatusCode::FORBIDDEN, "");
        assert!(matches!(&err, ApiError::Forbidden(m) if m == "Forbidden"));
        assert!(!err.requires_login());
    }

    #[test]
    fn test_conflict_and_not_found() {
        let err = ApiError::from_status(
            StatusCode::CONFLICT,
            r#"{"message": "Produto já está nos favoritos"}"#,
        );
        assert!(matches!(err, ApiError::Conflict(_)));
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, "{}"),
            ApiError::NotFound(_)
        ));
    }

    #[test]
    fn test_validation_fields() {
        let body = r#"{"message": "validation error", "errors": {"preco": "deve ser numérico", "id": 1}}"#;
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, body);
        let fields = err.field_errors();
        assert_eq!(fields.get("preco").map(String::as_str), Some("deve ser numérico"));
        assert_eq!(fields.get("id").map(String::as_str), Some("1"));
        assert_eq!(err.user_message(), "validation error");
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, "not json");
        assert!(matches!(err, ApiError::Server { status: 503, .. }));
        assert!(err.is_retryable());
        assert!(!ApiError::Unauthorized(String::new()).is_retryable());
        assert!(!ApiError::Forbidden(String::new()).is_retryable());
    }

    #[test]
    fn test_unexpected_status() {
        let err = ApiError::from_status(StatusCode::IM_A_TEAPOT, "");
        assert!(matches!(err, ApiError::UnexpectedStatus { status: 418, .. }));
    }

    #[test]
    fn test_local_validation_error() {
        let err = ApiError::validation("email", "email must look like name@domain");
        assert_eq!(err.field_errors().len(), 1);
        assert!(err.field_errors().contains_key("email"));
    }
}
