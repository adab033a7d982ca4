//! One logical session: every service, constructed and wired together.

use std::sync::Arc;

use luxus_core::UserSnapshot;
use secrecy::SecretString;
use tracing::{info, instrument};

use crate::auth::{CredentialStore, HttpRenewer, RefreshCoordinator, UserStore};
use crate::cache::ResponseCache;
use crate::catalog::CatalogClient;
use crate::collections::{Cart, Favorites};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::gateway::RequestGateway;
use crate::storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
use crate::sync::{ReconcileReport, SyncReconciler};

/// Entry point for host applications.
///
/// ```no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use luxus_client::{ClientConfig, Session};
/// use secrecy::SecretString;
///
/// let session = Session::from_config(ClientConfig::new("http://localhost:5000/api")?).await?;
/// session.login("ana@example.com", &SecretString::from("hunter22")).await?;
/// let products = session.catalog().products(1, 20, None).await?;
/// if let Some(first) = products.items.first() {
///     session.cart().add(first).await;
/// }
/// # Ok(())
/// # }
/// ```
pub struct Session {
    config: ClientConfig,
    credentials: Arc<CredentialStore>,
    users: Arc<UserStore>,
    gateway: RequestGateway,
    catalog: CatalogClient,
    cart: Arc<Cart>,
    favorites: Arc<Favorites>,
    reconciler: SyncReconciler,
}

impl Session {
    /// Wire a session over `storage`. Nothing is loaded yet; call
    /// [`restore`](Self::restore).
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Network` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, storage: Arc<dyn KeyValueStore>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("luxus-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let credentials = Arc::new(CredentialStore::new(Arc::clone(&storage)));
        let users = Arc::new(UserStore::new(Arc::clone(&storage)));
        let renewer = Arc::new(HttpRenewer::new(client.clone(), config.api_url.clone()));
        let refresh = Arc::new(RefreshCoordinator::new(Arc::clone(&credentials), renewer));
        let gateway = RequestGateway::new(
            client,
            config.api_url.clone(),
            Arc::clone(&credentials),
            refresh,
            config.retry.clone(),
        );

        let cache = Arc::new(ResponseCache::new(config.cache_ttl));
        let catalog = CatalogClient::new(gateway.clone(), cache.as_ref().clone());
        let cart = Arc::new(Cart::new(
            Arc::clone(&storage),
            gateway.clone(),
            Arc::clone(&users),
            config.cart_policy,
            config.shipping,
        ));
        let favorites = Arc::new(Favorites::new(storage, gateway.clone(), Arc::clone(&users)));
        let reconciler = SyncReconciler::new(
            gateway.clone(),
            Arc::clone(&users),
            Arc::clone(&cart),
            Arc::clone(&favorites),
            cache,
        );

        Ok(Self {
            config,
            credentials,
            users,
            gateway,
            catalog,
            cart,
            favorites,
            reconciler,
        })
    }

    /// Build a session with the storage `config` asks for (a directory or
    /// memory) and restore persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or storage cannot be set up.
    pub async fn from_config(config: ClientConfig) -> Result<Self, ApiError> {
        let storage: Arc<dyn KeyValueStore> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStore::open(dir).await?),
            None => Arc::new(MemoryStore::new()),
        };
        let session = Self::new(config, storage)?;
        session.restore().await?;
        Ok(session)
    }

    /// Load credential, user, cart and favorites from storage.
    ///
    /// # Errors
    ///
    /// Returns the storage backend's error.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<(), StorageError> {
        let signed_in = self.credentials.restore().await?;
        self.users.restore().await?;
        let cart = self.cart.load().await?;
        let favorites = self.favorites.load().await?;
        info!(signed_in, cart, favorites, "Session restored");
        Ok(())
    }

    /// Sign in and pull the user's collections.
    ///
    /// # Errors
    ///
    /// See [`SyncReconciler::login`].
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<UserSnapshot, ApiError> {
        self.reconciler.login(email, password).await
    }

    /// Sign out and clear all session state.
    pub async fn logout(&self) {
        self.reconciler.logout().await;
    }

    /// Reconcile after the app returns to the foreground.
    pub async fn resume(&self) -> ReconcileReport {
        self.reconciler.resume().await
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.credentials.is_authenticated()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<UserSnapshot> {
        self.users.get()
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub const fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    #[must_use]
    pub const fn catalog(&self) -> &CatalogClient {
        &self.catalog
    }

    #[must_use]
    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    #[must_use]
    pub fn favorites(&self) -> &Favorites {
        &self.favorites
    }

    #[must_use]
    pub const fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("api_url", &self.config.api_url)
            .field("signed_in", &self.is_signed_in())
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}
