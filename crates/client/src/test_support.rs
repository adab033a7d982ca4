//! Shared fixtures for unit tests.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use luxus_core::{UserId, UserRole, UserSnapshot};
use wiremock::MockServer;

use crate::auth::{Credential, CredentialStore, HttpRenewer, RefreshCoordinator, UserStore};
use crate::gateway::{RequestGateway, RetryPolicy};
use crate::storage::MemoryStore;

pub const USER_ID: i32 = 7;

/// Storage, auth stores and a gateway pointed at a mock server.
pub struct Harness {
    pub storage: Arc<MemoryStore>,
    pub credentials: Arc<CredentialStore>,
    pub users: Arc<UserStore>,
    pub gateway: RequestGateway,
}

impl Harness {
    pub fn new(server: &MockServer) -> Self {
        let storage = Arc::new(MemoryStore::new());
        let credentials = Arc::new(CredentialStore::new(storage.clone()));
        let users = Arc::new(UserStore::new(storage.clone()));
        let client = reqwest::Client::new();
        let renewer = Arc::new(HttpRenewer::new(client.clone(), server.uri()));
        let refresh = Arc::new(RefreshCoordinator::new(credentials.clone(), renewer));
        let retry = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            jitter: Duration::ZERO,
        };
        let gateway = RequestGateway::new(client, server.uri(), credentials.clone(), refresh, retry);
        Self {
            storage,
            credentials,
            users,
            gateway,
        }
    }

    /// Store a fresh `access-0` credential and user 7.
    pub async fn sign_in(&self) {
        self.credentials
            .set(Credential::with_lifetime("access-0", "refresh-0", 3600))
            .await
            .unwrap();
        self.users
            .set(UserSnapshot {
                id: UserId::new(USER_ID),
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                role: UserRole::Customer,
            })
            .await
            .unwrap();
    }
}
