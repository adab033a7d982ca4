//! Request gateway.
//!
//! Every call to the storefront API goes through [`RequestGateway::call`],
//! which:
//!
//! - attaches `Authorization: Bearer` to protected routes only
//! - renews a locally expired credential before sending
//! - on 401 asks the [`RefreshCoordinator`] for a new credential and replays
//!   the request once
//! - retries network errors and 5xx responses with exponential backoff

mod request;
mod retry;

use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

pub use request::{ApiRequest, ApiResponse, RouteClass};
pub use retry::RetryPolicy;

use crate::auth::{Credential, CredentialStore, RefreshCoordinator, RefreshError};
use crate::error::ApiError;

/// Authenticated HTTP access to the storefront API.
///
/// Cheap to clone; clones share the HTTP connection pool and the session's
/// credential store and refresh coordinator.
#[derive(Clone)]
pub struct RequestGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    refresh: Arc<RefreshCoordinator>,
    retry: RetryPolicy,
}

impl RequestGateway {
    /// Create a gateway.
    ///
    /// `client` should carry the per-call timeout; `base_url` has no trailing
    /// slash and request paths start with `/`.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        credentials: Arc<CredentialStore>,
        refresh: Arc<RefreshCoordinator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                client,
                base_url: base_url.into(),
                credentials,
                refresh,
                retry,
            }),
        }
    }

    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.inner.credentials
    }

    #[must_use]
    pub fn refresh(&self) -> &Arc<RefreshCoordinator> {
        &self.inner.refresh
    }

    /// Issue `request`.
    ///
    /// # Errors
    ///
    /// - `ApiError::NotSignedIn` for a protected route with no credential
    /// - `ApiError::SessionExpired` if renewal failed or the replayed request
    ///   was refused again; the session has been torn down
    /// - any other classified failure, after transient retries
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn call(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let route = request.route_class();
        if !route.needs_credential() {
            debug!(?route, "Sending without credential");
            return self.send_with_retry(&request, None).await;
        }

        let mut credential = self.credential_for_send().await?;
        loop {
            let token = credential.access_token.expose_secret().to_string();
            match self.send_with_retry(&request, Some(&token)).await {
                Err(ApiError::Unauthorized(message)) if request.retried => {
                    warn!(%message, "Replayed request refused, ending session");
                    self.inner.credentials.clear().await;
                    return Err(ApiError::SessionExpired(message));
                }
                Err(ApiError::Unauthorized(_)) => {
                    debug!("Credential refused, requesting renewal");
                    credential = self
                        .inner
                        .refresh
                        .request_refresh(Some(&token))
                        .await
                        .map_err(session_expired)?;
                    request.retried = true;
                }
                other => return other,
            }
        }
    }

    /// `GET path` and deserialize the body.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), plus `ApiError::Parse`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call(ApiRequest::get(path)).await?.json()
    }

    /// Issue `request` and deserialize the body.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), plus `ApiError::Parse`.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.call(request).await?.json()
    }

    /// The credential to send: waits out an in-flight renewal and renews a
    /// locally expired credential first.
    async fn credential_for_send(&self) -> Result<Credential, ApiError> {
        if let Some(outcome) = self.inner.refresh.wait_if_refreshing().await {
            return outcome.map_err(session_expired);
        }

        let credential = self.inner.credentials.get().ok_or(ApiError::NotSignedIn)?;
        if !credential.is_expired() {
            return Ok(credential);
        }

        debug!("Credential expired locally, renewing before send");
        let stale = credential.access_token.expose_secret().to_string();
        self.inner
            .refresh
            .request_refresh(Some(&stale))
            .await
            .map_err(session_expired)
    }

    async fn send_with_retry(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let retry = &self.inner.retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(request, token).await {
                Err(e) if e.is_retryable() && retry.should_retry(attempt) => {
                    let delay = retry.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = retry.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.inner.base_url, request.path);
        let mut builder = self
            .inner
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone());
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            Ok(ApiResponse { status, body })
        } else {
            Err(ApiError::from_status(status, &body))
        }
    }
}

fn session_expired(err: RefreshError) -> ApiError {
    ApiError::SessionExpired(err.to_string())
}

impl std::fmt::Debug for RequestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGateway")
            .field("base_url", &self.inner.base_url)
            .field("retry", &self.inner.retry)
            .finish_non_exhaustive()
    }
}
