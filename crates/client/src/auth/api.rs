//! Authentication endpoints.
//!
//! Both calls are auth-bootstrap routes: they never carry the bearer token
//! and are never subject to renewal.

use luxus_core::{Email, UserSnapshot};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{Credential, CredentialRenewer, DEFAULT_LIFETIME_SECS};
use crate::error::ApiError;
use crate::gateway::{ApiRequest, RequestGateway};

/// Sign-in endpoint, relative to the API base URL.
pub const AUTH_PATH: &str = "/users/auth";

/// Renewal endpoint, relative to the API base URL.
pub const REFRESH_PATH: &str = "/users/refresh-token";

/// Result of a successful sign-in.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub user: UserSnapshot,
    pub credential: Credential,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    user: UserSnapshot,
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    /// The API rotates refresh tokens; older deployments omit it.
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Sign in with email and password.
///
/// Sent through the gateway as an auth-bootstrap call: no bearer token, but
/// network and server failures are retried like any other call.
///
/// # Errors
///
/// - `ApiError::Unauthorized` for wrong credentials
/// - `ApiError::Forbidden` when the account's email is not confirmed
/// - `ApiError::Network` if the server cannot be reached
#[instrument(skip(gateway, password), fields(email = %email))]
pub async fn authenticate(
    gateway: &RequestGateway,
    email: &Email,
    password: &SecretString,
) -> Result<LoginGrant, ApiError> {
    let body = serde_json::to_value(AuthRequest {
        email: email.as_str(),
        password: password.expose_secret(),
    })?;
    let auth: AuthResponse = gateway.send_json(ApiRequest::post(AUTH_PATH, body)).await?;

    Ok(LoginGrant {
        user: auth.user,
        credential: Credential::with_lifetime(
            auth.access_token,
            auth.refresh_token,
            auth.expires_in.unwrap_or(DEFAULT_LIFETIME_SECS),
        ),
    })
}

/// Exchange a refresh token for a new credential.
///
/// Only the refresh token is sent.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` if the refresh token was rejected, or the
/// transport/server failure.
#[instrument(skip_all)]
pub async fn refresh_credential(
    client: &reqwest::Client,
    base_url: &str,
    refresh_token: &SecretString,
) -> Result<Credential, ApiError> {
    let response = client
        .post(format!("{base_url}{REFRESH_PATH}"))
        .json(&RefreshRequest {
            refresh_token: refresh_token.expose_secret(),
        })
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::from_status(status, &body));
    }

    let renewed: RefreshResponse = serde_json::from_str(&body)?;
    let refresh = renewed
        .refresh_token
        .unwrap_or_else(|| refresh_token.expose_secret().to_string());
    Ok(Credential::with_lifetime(
        renewed.access_token,
        refresh,
        renewed.expires_in.unwrap_or(DEFAULT_LIFETIME_SECS),
    ))
}

/// [`CredentialRenewer`] backed by the `/users/refresh-token` endpoint.
#[derive(Debug, Clone)]
pub struct HttpRenewer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRenewer {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl CredentialRenewer for HttpRenewer {
    async fn renew(&self, refresh_token: &SecretString) -> Result<Credential, ApiError> {
        refresh_credential(&self.client, &self.base_url, refresh_token).await
    }
}
