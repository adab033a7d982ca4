//! Credential custody and renewal.
//!
//! - [`CredentialStore`] holds the access/refresh token pair (mirror + storage)
//! - [`UserStore`] holds the signed-in user snapshot
//! - [`RefreshCoordinator`] makes sure at most one renewal is in flight
//! - [`api`] talks to the two authentication endpoints

pub mod api;
mod credentials;
mod refresh;
mod user;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};

pub use api::{HttpRenewer, LoginGrant};
pub use credentials::CredentialStore;
pub use refresh::{RefreshCoordinator, RefreshError, RefreshStatus};
pub use user::UserStore;

use crate::error::ApiError;

/// Seconds before `expires_at` at which a credential is already treated as
/// expired.
pub const EXPIRY_MARGIN_SECS: i64 = 300;

/// Lifetime assumed when the server omits `expires_in`.
pub const DEFAULT_LIFETIME_SECS: i64 = 86_400;

/// Upper bound on a server-supplied lifetime (one year).
const MAX_LIFETIME_SECS: i64 = 31_536_000;

/// Bearer credential: access token, refresh token and access-token expiry.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Token sent as `Authorization: Bearer`.
    pub access_token: SecretString,
    /// Token exchanged for a new pair at `/users/refresh-token`.
    pub refresh_token: SecretString,
    /// When the access token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from explicit parts.
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: SecretString::from(refresh_token.into()),
            expires_at,
        }
    }

    /// Build a credential that expires `expires_in` seconds from now.
    #[must_use]
    pub fn with_lifetime(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: i64,
    ) -> Self {
        let secs = expires_in.clamp(0, MAX_LIFETIME_SECS);
        let expires_at = Utc::now() + TimeDelta::seconds(secs);
        Self::new(access_token, refresh_token, expires_at)
    }

    /// Check if the access token has expired (with a 5 minute margin).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_within(EXPIRY_MARGIN_SECS)
    }

    /// Check if the access token will expire within the given number of seconds.
    ///
    /// An expiry too far out of range to compare is treated as expired.
    #[must_use]
    pub fn expires_within(&self, seconds: i64) -> bool {
        TimeDelta::try_seconds(seconds)
            .and_then(|margin| self.expires_at.checked_sub_signed(margin))
            .is_none_or(|deadline| Utc::now() >= deadline)
    }

    /// Whether this credential carries `access_token`.
    #[must_use]
    pub fn has_access_token(&self, access_token: &str) -> bool {
        self.access_token.expose_secret() == access_token
    }
}

/// Notified when the session ends (logout or failed renewal).
///
/// Cart, favorites, the user store and the response cache implement this and
/// register with the [`CredentialStore`].
#[async_trait]
pub trait SessionListener: Send + Sync {
    /// Drop all session-scoped state.
    async fn session_ended(&self);
}

/// Exchanges a refresh token for a new credential.
#[async_trait]
pub trait CredentialRenewer: Send + Sync {
    /// Perform one renewal call.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; the caller decides what it means for
    /// the session.
    async fn renew(&self, refresh_token: &SecretString) -> Result<Credential, ApiError>;
}
