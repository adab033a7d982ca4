//! Request and response values passed through the gateway.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// How a route is authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Anonymous catalog reads.
    PublicRead,
    /// Sign-in, registration and renewal: never carry the bearer token.
    AuthBootstrap,
    /// Everything else.
    Protected,
}

const PUBLIC_READ_PREFIXES: &[&str] = &["/products", "/categories", "/health"];

const AUTH_BOOTSTRAP_PATHS: &[&str] = &[
    "/users/auth",
    "/users/refresh-token",
    "/users/forgot-password",
    "/users/reset-password",
    "/users/resend-confirmation",
];

impl RouteClass {
    /// Classify `method path`. Query strings are ignored.
    #[must_use]
    pub fn classify(method: &Method, path: &str) -> Self {
        let path = path.split('?').next().unwrap_or(path).trim_end_matches('/');

        if AUTH_BOOTSTRAP_PATHS.contains(&path)
            || path.starts_with("/users/confirm-email/")
            || (*method == Method::POST && path == "/users")
        {
            return Self::AuthBootstrap;
        }

        if *method == Method::GET
            && PUBLIC_READ_PREFIXES
                .iter()
                .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")))
        {
            return Self::PublicRead;
        }

        Self::Protected
    }

    /// Whether calls on this route carry the bearer token.
    #[must_use]
    pub const fn needs_credential(self) -> bool {
        matches!(self, Self::Protected)
    }
}

/// A call to the storefront API, relative to the configured base URL.
///
/// The `retried` flag is owned by the gateway: a request is replayed after a
/// renewal at most once.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) body: Option<Value>,
    pub(crate) headers: HeaderMap,
    pub(crate) retried: bool,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
            retried: false,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidRequest` if the name or value is not a
    /// legal header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ApiError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ApiError::InvalidRequest(format!("header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::InvalidRequest(format!("header '{name}': {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Whether this request has already been replayed after a renewal.
    #[must_use]
    pub const fn is_retried(&self) -> bool {
        self.retried
    }

    #[must_use]
    pub fn route_class(&self) -> RouteClass {
        RouteClass::classify(&self.method, &self.path)
    }
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// Deserialize the body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Parse` if the body is not the expected JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_reads_are_public() {
        assert_eq!(RouteClass::classify(&Method::GET, "/products"), RouteClass::PublicRead);
        assert_eq!(
            RouteClass::classify(&Method::GET, "/products/42?fields=preco"),
            RouteClass::PublicRead
        );
        assert_eq!(RouteClass::classify(&Method::GET, "/categories/"), RouteClass::PublicRead);
        assert_eq!(RouteClass::classify(&Method::GET, "/health"), RouteClass::PublicRead);
    }

    #[test]
    fn test_catalog_writes_are_protected() {
        assert_eq!(RouteClass::classify(&Method::POST, "/products"), RouteClass::Protected);
        assert_eq!(RouteClass::classify(&Method::DELETE, "/products/1"), RouteClass::Protected);
        assert_eq!(RouteClass::classify(&Method::GET, "/productsx"), RouteClass::Protected);
    }

    #[test]
    fn test_auth_bootstrap_routes() {
        for path in ["/users/auth", "/users/refresh-token", "/users/confirm-email/abc"] {
            assert_eq!(RouteClass::classify(&Method::POST, path), RouteClass::AuthBootstrap);
        }
        assert_eq!(RouteClass::classify(&Method::GET, "/users/confirm-email/abc"), RouteClass::AuthBootstrap);
        assert_eq!(RouteClass::classify(&Method::POST, "/users"), RouteClass::AuthBootstrap);
        assert_eq!(RouteClass::classify(&Method::GET, "/users"), RouteClass::Protected);
        assert!(!RouteClass::AuthBootstrap.needs_credential());
    }

    #[test]
    fn test_collections_are_protected() {
        assert!(RouteClass::classify(&Method::GET, "/cart/7").needs_credential());
        assert!(RouteClass::classify(&Method::POST, "/favorites").needs_credential());
    }

    #[test]
    fn test_with_header_rejects_invalid_values() {
        let request = ApiRequest::get("/favorites").with_header("X-User-Id", "7").unwrap();
        assert_eq!(request.headers.get("x-user-id").unwrap(), "7");
        assert!(!request.is_retried());

        assert!(matches!(
            ApiRequest::get("/favorites").with_header("X-User-Id", "7\n"),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_response_json() {
        let response = ApiResponse {
            status: StatusCode::OK,
            body: r#"{"total": 2}"#.to_string(),
        };
        let value: Value = response.json().unwrap();
        assert_eq!(value["total"], 2);
        let bad: Result<Vec<u8>, _> = response.json();
        assert!(matches!(bad, Err(ApiError::Parse(_))));
    }
}
