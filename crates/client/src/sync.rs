//! Reconciliation of local collections with the server at session
//! transitions: login, logout and foreground resume.
//!
//! There is no background loop. Between transitions the collections run
//! local-first and only mark themselves dirty when a remote call fails.

use std::fmt;
use std::sync::Arc;

use luxus_core::{Email, UserSnapshot};
use secrecy::SecretString;
use tracing::{debug, info, instrument, warn};

use crate::auth::{UserStore, api};
use crate::cache::ResponseCache;
use crate::collections::{Cart, Favorites};
use crate::error::ApiError;
use crate::gateway::RequestGateway;

/// What happened to one collection during reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CollectionSync {
    /// Not signed in, or the session ended mid-exchange; nothing to
    /// reconcile.
    #[default]
    Skipped,
    /// Remote state was fetched and replaced local state, after pushing
    /// local changes first when `pushed`.
    Synced { pushed: bool, items: usize },
    /// The exchange failed; local state was kept and marked dirty.
    Failed(String),
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub cart: CollectionSync,
    pub favorites: CollectionSync,
}

impl ReconcileReport {
    /// Whether both collections now match the server.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self.cart, CollectionSync::Synced { .. })
            && matches!(self.favorites, CollectionSync::Synced { .. })
    }
}

/// Brings the local collections in line with the server.
///
/// Constructing a reconciler registers the user store, collections and
/// response cache as session listeners, so ending the session (logout or a
/// failed renewal) clears all of them.
pub struct SyncReconciler {
    gateway: RequestGateway,
    users: Arc<UserStore>,
    cart: Arc<Cart>,
    favorites: Arc<Favorites>,
    cache: Arc<ResponseCache>,
}

impl SyncReconciler {
    #[must_use]
    pub fn new(
        gateway: RequestGateway,
        users: Arc<UserStore>,
        cart: Arc<Cart>,
        favorites: Arc<Favorites>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        let credentials = gateway.credentials();
        credentials.register_listener(&users);
        credentials.register_listener(&cart);
        credentials.register_listener(&favorites);
        credentials.register_listener(&cache);
        Self {
            gateway,
            users,
            cart,
            favorites,
            cache,
        }
    }

    /// Sign in, store the credential and user, then pull both collections
    /// (server wins). An active session is ended first.
    ///
    /// A failed pull does not fail the login: local state is kept and marked
    /// dirty for the next [`resume`](Self::resume).
    ///
    /// # Errors
    ///
    /// - `ApiError::Validation` (field `email`) for a malformed email
    /// - `ApiError::Unauthorized` for wrong credentials
    /// - `ApiError::Forbidden` when the email is not confirmed
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<UserSnapshot, ApiError> {
        let email = Email::parse(email).map_err(|e| ApiError::validation("email", e.to_string()))?;

        if self.gateway.credentials().is_authenticated() {
            info!("Ending previous session before sign-in");
            self.logout().await;
        }

        let grant = api::authenticate(&self.gateway, &email, password).await?;

        if let Err(e) = self.gateway.credentials().set(grant.credential).await {
            warn!(error = %e, "Credential could not be persisted; session lasts until restart");
        }
        if let Err(e) = self.users.set(grant.user.clone()).await {
            warn!(error = %e, "User could not be persisted");
        }
        info!(user_id = %grant.user.id, "Signed in");

        let report = self.pull_all().await;
        if !report.is_clean() {
            warn!(?report, "Initial sync incomplete");
        }
        Ok(grant.user)
    }

    /// End the session: credential, user, collections and cache are cleared,
    /// whether or not storage cooperates.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.gateway.credentials().clear().await;
        info!("Signed out");
    }

    /// Foreground resume: wait for queued remote calls, push dirty
    /// collections, then pull.
    #[instrument(skip(self))]
    pub async fn resume(&self) -> ReconcileReport {
        self.cart.settle().await;
        self.favorites.settle().await;

        if !self.is_signed_in() {
            return ReconcileReport::default();
        }

        let cart = self.sync_cart(self.cart.is_dirty()).await;
        let favorites = self.sync_favorites(self.favorites.is_dirty()).await;
        let report = ReconcileReport { cart, favorites };
        info!(?report, "Resume reconciliation finished");
        report
    }

    /// Pull both collections, discarding local state.
    async fn pull_all(&self) -> ReconcileReport {
        ReconcileReport {
            cart: self.sync_cart(false).await,
            favorites: self.sync_favorites(false).await,
        }
    }

    async fn sync_cart(&self, push: bool) -> CollectionSync {
        if push && let Err(e) = self.cart.push().await {
            return self.sync_failed("cart", e, || self.cart.mark_dirty());
        }
        match self.cart.pull().await {
            Ok(items) => CollectionSync::Synced { pushed: push, items },
            Err(e) => self.sync_failed("cart", e, || self.cart.mark_dirty()),
        }
    }

    async fn sync_favorites(&self, push: bool) -> CollectionSync {
        if push && let Err(e) = self.favorites.push().await {
            return self.sync_failed("favorites", e, || self.favorites.mark_dirty());
        }
        match self.favorites.pull().await {
            Ok(items) => CollectionSync::Synced { pushed: push, items },
            Err(e) => self.sync_failed("favorites", e, || self.favorites.mark_dirty()),
        }
    }

    /// A session that ended mid-exchange leaves nothing to retry; otherwise
    /// local state is kept and marked dirty.
    fn sync_failed(
        &self,
        collection: &'static str,
        error: ApiError,
        mark_dirty: impl FnOnce(),
    ) -> CollectionSync {
        if !self.is_signed_in() {
            debug!(collection, error = %error, "Session ended during sync");
            return CollectionSync::Skipped;
        }
        warn!(collection, error = %error, "Sync failed, keeping local state");
        mark_dirty();
        CollectionSync::Failed(error.to_string())
    }

    fn is_signed_in(&self) -> bool {
        self.gateway.credentials().is_authenticated() && self.users.get().is_some()
    }
}

impl fmt::Debug for SyncReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncReconciler")
            .field("cart", &self.cart)
            .field("favorites", &self.favorites)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
