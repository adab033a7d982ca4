//! Credential custody: in-memory mirror backed by persisted storage.

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{Credential, SessionListener};
use crate::storage::{self, KeyValueStore, StorageError, keys};

/// Persisted form of a [`Credential`].
#[derive(Serialize, Deserialize)]
struct StoredCredential {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl From<&Credential> for StoredCredential {
    fn from(credential: &Credential) -> Self {
        Self {
            access_token: credential.access_token.expose_secret().to_string(),
            refresh_token: credential.refresh_token.expose_secret().to_string(),
            expires_at: credential.expires_at,
        }
    }
}

impl From<StoredCredential> for Credential {
    fn from(stored: StoredCredential) -> Self {
        Self::new(stored.access_token, stored.refresh_token, stored.expires_at)
    }
}

/// Holder of the current credential.
///
/// Reads are synchronous against the mirror so the gateway never waits on
/// storage. Writers are the login flow and the [`RefreshCoordinator`].
///
/// [`RefreshCoordinator`]: super::RefreshCoordinator
pub struct CredentialStore {
    current: RwLock<Option<Credential>>,
    storage: Arc<dyn KeyValueStore>,
    listeners: Mutex<Vec<Weak<dyn SessionListener>>>,
}

impl CredentialStore {
    /// Create an empty store over `storage`. Call [`restore`](Self::restore)
    /// to load a persisted credential.
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            current: RwLock::new(None),
            storage,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Load the persisted credential into the mirror.
    ///
    /// A corrupt bundle is removed and the store stays signed out.
    ///
    /// # Errors
    ///
    /// Returns the storage backend's error.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<bool, StorageError> {
        let stored = match storage::read_json::<StoredCredential>(
            self.storage.as_ref(),
            keys::CREDENTIAL,
        )
        .await
        {
            Ok(stored) => stored,
            Err(StorageError::Corrupt { source, .. }) => {
                warn!(error = %source, "Discarding unreadable persisted credential");
                self.storage.remove(keys::CREDENTIAL).await?;
                None
            }
            Err(e) => return Err(e),
        };

        let restored = stored.is_some();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) =
            stored.map(Credential::from);
        debug!(restored, "Credential restored");
        Ok(restored)
    }

    /// Current credential, if signed in.
    #[must_use]
    pub fn get(&self) -> Option<Credential> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a credential is present (it may still need renewal).
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Replace the credential.
    ///
    /// The mirror is updated before persisting, so concurrent readers see the
    /// new credential immediately.
    ///
    /// # Errors
    ///
    /// Returns the storage error if persisting fails; the mirror keeps the
    /// new credential either way.
    pub async fn set(&self, credential: Credential) -> Result<(), StorageError> {
        let stored = StoredCredential::from(&credential);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(credential);
        storage::write_json(self.storage.as_ref(), keys::CREDENTIAL, &stored).await
    }

    /// Drop the credential and notify every registered listener.
    ///
    /// Listeners run even if removing the persisted key fails.
    #[instrument(skip(self))]
    pub async fn clear(&self) {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Err(e) = self.storage.remove(keys::CREDENTIAL).await {
            warn!(error = %e, "Failed to remove persisted credential");
        }

        let listeners = self.live_listeners();
        info!(listeners = listeners.len(), "Session ended");
        for listener in listeners {
            listener.session_ended().await;
        }
    }

    /// Register `listener` to be told when the session ends.
    ///
    /// Only a weak reference is kept; dropped listeners are pruned.
    pub fn register_listener<L: SessionListener + 'static>(&self, listener: &Arc<L>) {
        let weak = Arc::downgrade(listener);
        let weak: Weak<dyn SessionListener> = weak;
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(weak);
    }

    fn live_listeners(&self) -> Vec<Arc<dyn SessionListener>> {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|weak| weak.strong_count() > 0);
        listeners.iter().filter_map(Weak::upgrade).collect()
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}
