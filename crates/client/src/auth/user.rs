//! Signed-in user snapshot.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use luxus_core::{UserId, UserSnapshot};
use tracing::warn;

use super::SessionListener;
use crate::storage::{self, KeyValueStore, StorageError, keys};

/// Mirror + persisted copy of the user returned at sign-in.
///
/// Collection endpoints are addressed per user, so remote cart and favorites
/// calls need this alongside the credential.
pub struct UserStore {
    current: RwLock<Option<UserSnapshot>>,
    storage: Arc<dyn KeyValueStore>,
}

impl UserStore {
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            current: RwLock::new(None),
            storage,
        }
    }

    /// Load the persisted snapshot; a corrupt one is dropped.
    ///
    /// # Errors
    ///
    /// Returns the storage backend's error.
    pub async fn restore(&self) -> Result<(), StorageError> {
        let user = match storage::read_json::<UserSnapshot>(self.storage.as_ref(), keys::USER).await
        {
            Ok(user) => user,
            Err(StorageError::Corrupt { source, .. }) => {
                warn!(error = %source, "Discarding unreadable persisted user");
                self.storage.remove(keys::USER).await?;
                None
            }
            Err(e) => return Err(e),
        };
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = user;
        Ok(())
    }

    #[must_use]
    pub fn get(&self) -> Option<UserSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|user| user.id)
    }

    /// Replace the snapshot.
    ///
    /// # Errors
    ///
    /// Returns the storage error if persisting fails; the mirror is updated
    /// either way.
    pub async fn set(&self, user: UserSnapshot) -> Result<(), StorageError> {
        let result = storage::write_json(self.storage.as_ref(), keys::USER, &user).await;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(user);
        result
    }

    /// Drop the snapshot from memory and storage.
    pub async fn clear(&self) {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Err(e) = self.storage.remove(keys::USER).await {
            warn!(error = %e, "Failed to remove persisted user");
        }
    }
}

impl std::fmt::Debug for UserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserStore")
            .field("user_id", &self.user_id())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionListener for UserStore {
    async fn session_ended(&self) {
        self.clear().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use luxus_core::UserRole;

    use super::*;
    use crate::storage::MemoryStore;

    fn ana() -> UserSnapshot {
        UserSnapshot {
            id: UserId::new(7),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            role: UserRole::Customer,
        }
    }

    #[tokio::test]
    async fn test_set_restore_clear() {
        let storage = Arc::new(MemoryStore::new());
        let users = UserStore::new(storage.clone());
        users.set(ana()).await.unwrap();
        assert_eq!(users.user_id(), Some(UserId::new(7)));

        let reopened = UserStore::new(storage.clone());
        reopened.restore().await.unwrap();
        assert_eq!(reopened.get(), Some(ana()));

        reopened.session_ended().await;
        assert!(reopened.get().is_none());
        assert!(storage.get(keys::USER).await.unwrap().is_none());
    }
}
